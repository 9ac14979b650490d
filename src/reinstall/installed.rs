//! The set of packages currently installed, split into essential and the
//! rest.

use std::io;

use duct::cmd;
use sudo::RunningAs;
use thiserror::Error;

use crate::common::privileges::{PrivilegeError, require_root};
use crate::ui::prelude::*;

/// dpkg-query output format: name (arch-qualified when foreign), status,
/// Essential field.
const DPKG_QUERY_FORMAT: &str = "${binary:Package}\t${db:Status-Status}\t${Essential}\n";

/// Statuses that do not leave an installed version behind
const NOT_INSTALLED_STATUSES: &[&str] = &["not-installed", "config-files"];

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error("failed to query the package database: {0}")]
    Query(#[source] io::Error),

    #[error("unexpected package database record on line {line}: {record:?}")]
    Malformed { line: usize, record: String },
}

/// One package as the database reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub is_installed: bool,
    pub essential: bool,
}

/// Source of package records.
pub trait PackageDatabase {
    fn records(&self) -> Result<Vec<PackageRecord>, CollectError>;
}

/// The dpkg status database, read through `dpkg-query`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DpkgDatabase;

impl DpkgDatabase {
    pub fn parse(output: &str) -> Result<Vec<PackageRecord>, CollectError> {
        output
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                let mut fields = line.split('\t');
                let (Some(name), Some(status)) = (fields.next(), fields.next()) else {
                    return Err(CollectError::Malformed {
                        line: index + 1,
                        record: line.to_string(),
                    });
                };
                let name = name.trim();
                if name.is_empty() {
                    return Err(CollectError::Malformed {
                        line: index + 1,
                        record: line.to_string(),
                    });
                }
                let essential = fields.next().is_some_and(|v| v.trim() == "yes");
                Ok(PackageRecord {
                    name: name.to_string(),
                    is_installed: !NOT_INSTALLED_STATUSES.contains(&status.trim()),
                    essential,
                })
            })
            .collect()
    }
}

impl PackageDatabase for DpkgDatabase {
    fn records(&self) -> Result<Vec<PackageRecord>, CollectError> {
        emit(Level::Debug, "installed.query", "querying dpkg database", None);
        let output = cmd!("dpkg-query", "-W", "-f", DPKG_QUERY_FORMAT)
            .stderr_null()
            .read()
            .map_err(CollectError::Query)?;
        Self::parse(&output)
    }
}

/// Installed package names, in database order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledSet {
    pub essential: Vec<String>,
    pub other: Vec<String>,
}

impl InstalledSet {
    pub fn len(&self) -> usize {
        self.essential.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collect the installed packages. Requires root, checked before the
/// database is touched.
pub fn collect_installed(
    database: &dyn PackageDatabase,
    running_as: RunningAs,
) -> Result<InstalledSet, CollectError> {
    require_root(running_as)?;

    let mut set = InstalledSet::default();
    for record in database.records()? {
        if !record.is_installed {
            continue;
        }
        if record.essential {
            set.essential.push(record.name);
        } else {
            set.other.push(record.name);
        }
    }

    emit(
        Level::Debug,
        "installed.collected",
        &format!(
            "{} essential and {} other packages installed",
            set.essential.len(),
            set.other.len()
        ),
        None,
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedDatabase {
        records: Vec<PackageRecord>,
        queried: Cell<bool>,
    }

    impl FixedDatabase {
        fn new(records: &[(&str, bool, bool)]) -> Self {
            Self {
                records: records
                    .iter()
                    .map(|(name, is_installed, essential)| PackageRecord {
                        name: name.to_string(),
                        is_installed: *is_installed,
                        essential: *essential,
                    })
                    .collect(),
                queried: Cell::new(false),
            }
        }
    }

    impl PackageDatabase for FixedDatabase {
        fn records(&self) -> Result<Vec<PackageRecord>, CollectError> {
            self.queried.set(true);
            Ok(self.records.clone())
        }
    }

    #[test]
    fn test_partition_keeps_order() {
        let db = FixedDatabase::new(&[
            ("adduser", true, false),
            ("base-files", true, true),
            ("bash", true, true),
            ("old-lib", false, false),
            ("coreutils", true, true),
            ("vim", true, false),
        ]);

        let set = collect_installed(&db, RunningAs::Root).unwrap();

        assert_eq!(set.essential, vec!["base-files", "bash", "coreutils"]);
        assert_eq!(set.other, vec!["adduser", "vim"]);
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_requires_root_before_query() {
        let db = FixedDatabase::new(&[("bash", true, true)]);

        let err = collect_installed(&db, RunningAs::User).unwrap_err();

        assert!(matches!(err, CollectError::Privilege(PrivilegeError::NeedRoot)));
        assert!(!db.queried.get());
    }

    #[test]
    fn test_parse_dpkg_query_output() {
        let output = "\
adduser\tinstalled\t
bash\tinstalled\tyes
libc6:i386\tinstalled\tno
oldpkg\tconfig-files\t
halfdone\thalf-configured\t
gone\tnot-installed\t
";
        let records = DpkgDatabase::parse(output).unwrap();

        assert_eq!(records.len(), 6);
        assert_eq!(
            records[1],
            PackageRecord {
                name: "bash".to_string(),
                is_installed: true,
                essential: true,
            }
        );
        assert_eq!(records[2].name, "libc6:i386");
        assert!(!records[2].essential);
        assert!(!records[3].is_installed);
        assert!(records[4].is_installed);
        assert!(!records[5].is_installed);
    }

    #[test]
    fn test_parse_skips_blank_lines_and_tolerates_missing_essential() {
        let records = DpkgDatabase::parse("\nzsh\tinstalled\n\n").unwrap();
        assert_eq!(
            records,
            vec![PackageRecord {
                name: "zsh".to_string(),
                is_installed: true,
                essential: false,
            }]
        );
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        let err = DpkgDatabase::parse("bash\tinstalled\tyes\ngarbage\n").unwrap_err();
        assert!(matches!(err, CollectError::Malformed { line: 2, .. }));
    }
}
