//! Exit status codes used by `dk`, following the BSD sysexits convention.
//! reference: [SYSEXITS](https://man.freebsd.org/cgi/man.cgi?query=sysexits&apropos=0&sektion=0&manpath=FreeBSD+11.2-stable&arch=default&format=html)

/// value: 2 <br>
/// No subcommand was given.
pub const EX_KEYWORD: i32 = 2;

/// value: 65 <br>
/// An archive entry was rejected: unsafe path, size quota exceeded, or unreadable metadata.
pub const EX_DATAERR: i32 = 65;

/// value: 66 <br>
/// Nothing to work on: no files matched the configured items, or no backup exists.
pub const EX_NOINPUT: i32 = 66;

/// value: 69 <br>
/// The home directory could not be determined, or the encryption tool is missing or failed.
pub const EX_UNAVAILABLE: i32 = 69;

/// value: 70 <br>
/// An internal error, such as a background task that panicked.
pub const EX_SOFTWARE: i32 = 70;

/// value: 74 <br>
/// An error occurred while reading or writing a file.
pub const EX_IOERR: i32 = 74;

/// value: 75 <br>
/// The user declined the restore or the pre-restore safety backup.
pub const EX_TEMPFAIL: i32 = 75;

/// value: 78 <br>
/// The configuration file is missing required values or could not be parsed.
pub const EX_CONFIG: i32 = 78;
