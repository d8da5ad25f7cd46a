/// Filesystem helpers: directory scans and atomic writes.
pub mod fs;
