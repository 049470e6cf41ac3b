use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("resources")
        .join("test-fixtures")
}

pub fn load_fixture(relative_path: &str) -> io::Result<Vec<u8>> {
    let path = fixtures_root().join(relative_path);
    fs::read(path)
}

pub fn load_fixture_text(relative_path: &str) -> io::Result<String> {
    let bytes = load_fixture(relative_path)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
