//! ECP method name constants — every JSON-RPC method this core or one of
//! its shipped adapters answers, grouped by service namespace.

/// All ECP method names, grouped by service namespace.
pub struct Methods;

impl Methods {
    // ── Authentication ──────────────────────────────────────────────────
    pub const AUTH_HANDSHAKE: &str = "auth/handshake";

    // ── File system ─────────────────────────────────────────────────────
    pub const FILE_READ: &str = "file/read";
    pub const FILE_WRITE: &str = "file/write";
    pub const FILE_STAT: &str = "file/stat";
    pub const FILE_EXISTS: &str = "file/exists";
    pub const FILE_DELETE: &str = "file/delete";
    pub const FILE_RENAME: &str = "file/rename";
    pub const FILE_COPY: &str = "file/copy";
    pub const FILE_READ_DIR: &str = "file/readDir";
    pub const FILE_LIST: &str = "file/list";
    pub const FILE_CREATE_DIR: &str = "file/createDir";
    pub const FILE_DELETE_DIR: &str = "file/deleteDir";
    pub const FILE_SEARCH: &str = "file/search";
    pub const FILE_GLOB: &str = "file/glob";
    pub const FILE_GREP: &str = "file/grep";
    pub const FILE_EDIT: &str = "file/edit";
    pub const FILE_PATH_TO_URI: &str = "file/pathToUri";
    pub const FILE_URI_TO_PATH: &str = "file/uriToPath";
    pub const FILE_GET_PARENT: &str = "file/getParent";
    pub const FILE_GET_BASENAME: &str = "file/getBasename";
    pub const FILE_JOIN: &str = "file/join";

    // ── Terminal ────────────────────────────────────────────────────────
    pub const TERMINAL_EXECUTE: &str = "terminal/execute";

    // ── Document ────────────────────────────────────────────────────────
    pub const DOCUMENT_SAVE: &str = "document/save";

    // ── Secret ──────────────────────────────────────────────────────────
    pub const SECRET_GET: &str = "secret/get";
    pub const SECRET_SET: &str = "secret/set";
    pub const SECRET_HAS: &str = "secret/has";

    // ── Session ─────────────────────────────────────────────────────────
    pub const SESSION_CREATE: &str = "session/create";
    pub const SESSION_GET: &str = "session/get";

    /// Returns every method name this table lists, for diagnostics that
    /// want to flag a known-namespace-but-unknown-method request.
    pub fn all() -> &'static [&'static str] {
        &[
            Self::AUTH_HANDSHAKE,
            Self::FILE_READ,
            Self::FILE_WRITE,
            Self::FILE_STAT,
            Self::FILE_EXISTS,
            Self::FILE_DELETE,
            Self::FILE_RENAME,
            Self::FILE_COPY,
            Self::FILE_READ_DIR,
            Self::FILE_LIST,
            Self::FILE_CREATE_DIR,
            Self::FILE_DELETE_DIR,
            Self::FILE_SEARCH,
            Self::FILE_GLOB,
            Self::FILE_GREP,
            Self::FILE_EDIT,
            Self::FILE_PATH_TO_URI,
            Self::FILE_URI_TO_PATH,
            Self::FILE_GET_PARENT,
            Self::FILE_GET_BASENAME,
            Self::FILE_JOIN,
            Self::TERMINAL_EXECUTE,
            Self::DOCUMENT_SAVE,
            Self::SECRET_GET,
            Self::SECRET_SET,
            Self::SECRET_HAS,
            Self::SESSION_CREATE,
            Self::SESSION_GET,
        ]
    }
}

/// Type alias documenting intent at call sites that accept a method name.
pub type MethodName = str;

/// Whether `method` is one this table knows about. Adapters beyond the ones
/// shipped here may answer other methods under their own namespace; this is
/// advisory (used for diagnostics), not enforced on the dispatch path — the
/// registry's prefix match is what actually gates routing.
pub fn is_known_method(method: &str) -> bool {
    Methods::all().contains(&method)
}

/// The namespace (prefix before the first `/`) of a method name.
pub fn namespace_of(method: &str) -> &str {
    method.split('/').next().unwrap_or(method)
}
