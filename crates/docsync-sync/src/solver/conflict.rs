//! Conflict copies.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

/// Name of the copy that keeps a losing local version:
/// `<stem> (Conflict yyyy-MM-dd HHmmss).<ext>`.
pub fn conflict_copy_name(name: &str, at: NaiveDateTime) -> String {
    let stamp = at.format("%Y-%m-%d %H%M%S");
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} (Conflict {}){}", &name[..dot], stamp, &name[dot..]),
        _ => format!("{} (Conflict {})", name, stamp),
    }
}

/// A free path for the conflict copy of `path`, stamped with the current
/// local time. A numeric suffix is added when the stamp alone collides.
pub async fn conflict_copy_path(path: &Path) -> std::io::Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = conflict_copy_name(&name, Local::now().naive_local());
    let mut candidate = path.with_file_name(&base);
    let mut n = 1;
    while tokio::fs::try_exists(&candidate).await? {
        n += 1;
        candidate = path.with_file_name(suffixed(&base, n));
    }
    Ok(candidate)
}

fn suffixed(name: &str, n: u32) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} {}{}", &name[..dot], n, &name[dot..]),
        _ => format!("{} {}", name, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_copy_name_keeps_extension() {
        assert_eq!(
            conflict_copy_name("report.docx", at()),
            "report (Conflict 2024-03-09 140507).docx"
        );
        assert_eq!(
            conflict_copy_name("archive.tar.gz", at()),
            "archive.tar (Conflict 2024-03-09 140507).gz"
        );
    }

    #[test]
    fn test_copy_name_without_extension() {
        assert_eq!(conflict_copy_name("Makefile", at()), "Makefile (Conflict 2024-03-09 140507)");
        assert_eq!(conflict_copy_name(".profile", at()), ".profile (Conflict 2024-03-09 140507)");
    }

    #[tokio::test]
    async fn test_copy_path_avoids_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("a.txt");
        let first = conflict_copy_path(&original).await.unwrap();
        assert_eq!(first.parent(), Some(dir.path()));
        std::fs::write(&first, b"taken").unwrap();

        let second = conflict_copy_path(&original).await.unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().contains("(Conflict "));
    }
}
