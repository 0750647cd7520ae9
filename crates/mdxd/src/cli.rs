//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from startup logic.

use crate::error::StartupError;
use clap::Parser;
use std::path::PathBuf;

/// mdxd - serve MDict dictionaries over HTTP
#[derive(Parser, Debug)]
#[command(name = "mdxd")]
#[command(about = "Serve MDict dictionaries over HTTP", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Gateway port
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Directory holding the dictionaries (one subdirectory each, or a single dictionary)
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Config file (defaults to /etc/mdxd/config.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// `--dir` made absolute, checked to be a directory
    pub fn root_dir(&self) -> Result<PathBuf, StartupError> {
        let invalid = || StartupError::InvalidRoot {
            path: self.dir.clone(),
        };
        let root = self.dir.canonicalize().map_err(|_| invalid())?;
        if !root.is_dir() {
            return Err(invalid());
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mdxd", "--dir", "/srv/dicts"]).unwrap();
        assert_eq!(cli.port, 3000);
        assert_eq!(cli.dir, PathBuf::from("/srv/dicts"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from(["mdxd", "-p", "8080", "-d", "/srv/dicts", "-c", "/tmp/m.toml"])
            .unwrap();
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/m.toml")));
    }

    #[test]
    fn test_dir_is_required() {
        assert!(Cli::try_parse_from(["mdxd"]).is_err());
    }

    #[test]
    fn test_bad_port_is_rejected() {
        assert!(Cli::try_parse_from(["mdxd", "-d", "/x", "-p", "70000"]).is_err());
        assert!(Cli::try_parse_from(["mdxd", "-d", "/x", "-p", "abc"]).is_err());
    }

    #[test]
    fn test_root_dir_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mdx");
        std::fs::write(&file, "").unwrap();

        let cli = Cli::try_parse_from(["mdxd", "-d", file.to_str().unwrap()]).unwrap();
        assert!(matches!(cli.root_dir(), Err(StartupError::InvalidRoot { .. })));

        let cli = Cli::try_parse_from(["mdxd", "-d", "/nonexistent/mdxd"]).unwrap();
        assert!(cli.root_dir().is_err());

        let cli = Cli::try_parse_from(["mdxd", "-d", dir.path().to_str().unwrap()]).unwrap();
        assert!(cli.root_dir().unwrap().is_absolute());
    }
}
