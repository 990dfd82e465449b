//! Scanner test support
