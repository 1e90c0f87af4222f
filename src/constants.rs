/// Package name.
pub(crate) const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub(crate) const CONFIG_NAME: &str = "config.toml";
/// File name prefix of every backup archive.
pub(crate) const ARCHIVE_PREFIX: &str = "dotfiles-";
/// Directory under the backup directory holding safety backups.
pub(crate) const PRE_RESTORE_DIR: &str = "pre-restore";
/// Number of backups kept when the config leaves `max_backups` unset.
pub(crate) const DEFAULT_MAX_BACKUPS: usize = 14;
