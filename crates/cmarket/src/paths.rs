use directories::ProjectDirs;
use eyre::{Context as _, ContextCompat as _};
use std::{fs, path::Path, path::PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt as _;

#[cfg(unix)]
const MODE_DIR_PRIVATE: u32 = 0o700;

#[derive(Debug, Clone)]
pub struct CmarketPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl CmarketPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("CMARKET_DATA_DIR"),
            std::env::var("CMARKET_CONFIG_DIR"),
        ) {
            return Ok(Self::rooted(PathBuf::from(config_dir), PathBuf::from(data_dir)));
        }

        // macOS: ~/Library/Application Support/cmarket
        // Linux: ~/.config/cmarket
        // Windows: %APPDATA%\\cmarket
        let proj =
            ProjectDirs::from("", "", "cmarket").context("failed to resolve project dirs")?;
        Ok(Self::rooted(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    fn rooted(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join("cmarket.log.jsonl");
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        ensure_private_dir(&self.config_dir)?;
        ensure_private_dir(&self.data_dir)?;
        Ok(())
    }
}

fn ensure_private_dir(dir: &Path) -> eyre::Result<()> {
    if dir.exists() {
        let md = fs::symlink_metadata(dir).with_context(|| format!("stat {}", dir.display()))?;
        if md.file_type().is_symlink() {
            eyre::bail!("refusing to use symlinked directory: {}", dir.display());
        }
        if !md.is_dir() {
            eyre::bail!("expected directory at {}", dir.display());
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    }

    // Best-effort: the log file may carry addresses and tx hashes.
    #[cfg(unix)]
    {
        let md = fs::metadata(dir).with_context(|| format!("stat {}", dir.display()))?;
        if (md.permissions().mode() & 0o077) != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR_PRIVATE))
                .with_context(|| format!("chmod {MODE_DIR_PRIVATE:o} {}", dir.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_dirs() -> eyre::Result<()> {
        let tmp = tempfile::tempdir().context("tempdir")?;
        let p = CmarketPaths::rooted(tmp.path().join("cfg"), tmp.path().join("data"));
        p.ensure_private_dirs()?;
        assert!(p.config_dir.is_dir());
        assert!(p.data_dir.is_dir());
        assert_eq!(p.log_file, tmp.path().join("data").join("cmarket.log.jsonl"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinked_dir() -> eyre::Result<()> {
        let tmp = tempfile::tempdir().context("tempdir")?;
        let real = tmp.path().join("real");
        fs::create_dir_all(&real).context("mkdir")?;
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).context("symlink")?;
        let p = CmarketPaths::rooted(link, tmp.path().join("data"));
        assert!(p.ensure_private_dirs().is_err());
        Ok(())
    }
}
