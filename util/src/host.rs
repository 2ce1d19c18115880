//! Host platform utility functions

use std::path::{Path, PathBuf};

/// Environment variable giving the root directory of the software (containing `params/`,
/// `data/` and `sessions/`).
pub const SW_ROOT_ENV_VAR: &str = "PNP_SW_ROOT";

/// Retrieve the root directory of the software.
///
/// Uses the `PNP_SW_ROOT` environment variable if it is set, otherwise the current working
/// directory.
pub fn get_sw_root() -> std::io::Result<PathBuf> {
    match std::env::var_os(SW_ROOT_ENV_VAR) {
        Some(root) => Ok(PathBuf::from(root)),
        None => std::env::current_dir(),
    }
}

/// Resolve a path from a parameter file against the software root, absolute paths are kept as
/// they are.
pub fn resolve_path<P: AsRef<Path>>(path: P) -> std::io::Result<PathBuf> {
    let path = path.as_ref();

    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(get_sw_root()?.join(path))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let root = get_sw_root().unwrap();

        assert_eq!(
            resolve_path("data/bench.png").unwrap(),
            root.join("data").join("bench.png")
        );

        let absolute = root.join("sequences.json");
        assert_eq!(resolve_path(&absolute).unwrap(), absolute);
    }
}
