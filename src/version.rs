//! Build identification, reported at startup and by `--version`.

/// Release builds stamp `DOCKWARDEN_VERSION`; local builds report the crate version.
pub const VERSION: &str = match option_env!("DOCKWARDEN_VERSION") {
    Some(stamped) => stamped,
    None => env!("CARGO_PKG_VERSION"),
};

/// `dockwarden <version>`, as written to the log on startup.
pub fn banner() -> String {
    format!("{} {VERSION}", env!("CARGO_PKG_NAME"))
}
