//! Small path helpers for SSH client arguments.

/// Expands a leading `~/` to the value of `HOME`.
///
/// Paths without the prefix, and all paths when `HOME` is unset, are returned
/// unchanged so the SSH client can report the problem itself.
///
/// # Examples
///
/// ```
/// # use employ::ssh::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/known_hosts"), format!("{home}/.ssh/known_hosts"));
/// assert_eq!(expand_tilde("/dev/null"), "/dev/null");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => format!("{}/{rest}", home.to_string_lossy()),
        _ => path.to_owned(),
    }
}
