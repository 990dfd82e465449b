//! Worker Protocol Version
//!
//! Provides the build-time protocol version read from Cargo.toml metadata.
//! The version is defined under package.metadata.gevol.protocol_version and is
//! stamped on every message exchanged between the dispatcher and its workers.

// Include the build-generated protocol version constant
include!(concat!(env!("OUT_DIR"), "/protocol_version.rs"));

/// Get the current worker protocol version
///
/// To increment the protocol version:
/// 1. Edit Cargo.toml: package.metadata.gevol.protocol_version = NEW_VERSION
/// 2. Commit the change to source control
/// 3. Build - new version will be used
///
/// Version format: YYYYMMDD (e.g., 20261019 = 19 October 2026)
pub fn get_protocol_version() -> i64 {
    PROTOCOL_VERSION
}

/// Convert a YYYYMMDD version to a YYYY-MM-DD string
pub fn version_to_date_string(version: i64) -> String {
    let year = version / 10000;
    let month = (version % 10000) / 100;
    let day = version % 100;
    format!("{year:04}-{month:02}-{day:02}")
}

/// Workers only accept requests stamped with exactly their own version;
/// dispatcher and worker are always the same executable.
pub fn is_protocol_compatible(version: i64) -> bool {
    version == get_protocol_version()
}
