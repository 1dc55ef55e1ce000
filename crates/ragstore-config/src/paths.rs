use std::path::PathBuf;

/// Default on-disk location of the vector database.
///
/// `<data_local_dir>/ragstore/vectors.db`, or `./ragstore_vectors.db` when the
/// platform has no data directory.
pub fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|dir| dir.join("ragstore").join("vectors.db"))
        .unwrap_or_else(|| PathBuf::from("ragstore_vectors.db"))
        .to_string_lossy()
        .into_owned()
}

/// Path value that selects an in-memory SQLite database.
pub const IN_MEMORY: &str = ":memory:";
