//! Line-oriented `KEY=VALUE` environment file patching.

use std::borrow::Cow;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Variable the refresh token is stored under
pub const REFRESH_TOKEN_KEY: &str = "GOOGLE_ADS_REFRESH_TOKEN";

const SECTION_COMMENT: &str = "# Google Ads API";

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("Failed to read env file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write env file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Set `key` to `value` in the given file contents.
///
/// The first `key=` line is rewritten in place and any later ones are dropped;
/// every other line is kept as is. Without such a line, a commented section is
/// appended after a blank line.
pub fn upsert(contents: &str, key: &str, value: &str) -> String {
    let prefix = format!("{}=", key);
    let mut replaced = false;
    let mut lines: Vec<Cow<'_, str>> = Vec::new();

    for line in contents.split('\n') {
        if !line.starts_with(&prefix) {
            lines.push(Cow::Borrowed(line));
            continue;
        }
        if !replaced {
            let cr = if line.ends_with('\r') { "\r" } else { "" };
            lines.push(Cow::Owned(format!("{}{}{}", prefix, value, cr)));
            replaced = true;
        }
    }

    if replaced {
        return lines.join("\n");
    }

    let eol = if contents.contains("\r\n") { "\r\n" } else { "\n" };
    let mut updated = contents.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push_str(eol);
    }
    updated.push_str(&format!("{eol}{SECTION_COMMENT}{eol}{prefix}{value}{eol}"));
    updated
}

/// Insert or replace the refresh token line in the env file at `path`.
///
/// A missing file is created (owner read/write only on Unix).
pub fn save_refresh_token(path: &Path, refresh_token: &str) -> Result<(), EnvFileError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(EnvFileError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let updated = upsert(&contents, REFRESH_TOKEN_KEY, refresh_token);

    write_contents(path, &updated).map_err(|source| EnvFileError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), "refresh token written to env file");
    Ok(())
}

/// Replace `path` by renaming a sibling temp file over it, so an interrupted
/// write never leaves a truncated file behind.
fn write_contents(path: &Path, contents: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    // Temp files are created owner-only (0600 on unix)
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;

    match std::fs::metadata(path) {
        Ok(existing) => std::fs::set_permissions(tmp.path(), existing.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
