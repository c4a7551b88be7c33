//! Namespaces and process environment for the sandboxed child.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, trace, warn};

use crate::error::DirectiveError;

/// A namespace that bwrap can unshare (`--unshare-<name>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Every namespace bwrap supports.
    All,
    User,
    /// User namespace, silently skipped when unavailable.
    UserTry,
    Ipc,
    Pid,
    Net,
    Uts,
    Cgroup,
    /// Cgroup namespace, silently skipped when unavailable.
    CgroupTry,
}

impl Namespace {
    /// The name used in the `--unshare-<name>` flag and in profiles.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::User => "user",
            Self::UserTry => "user-try",
            Self::Ipc => "ipc",
            Self::Pid => "pid",
            Self::Net => "net",
            Self::Uts => "uts",
            Self::Cgroup => "cgroup",
            Self::CgroupTry => "cgroup-try",
        }
    }

    fn flag(self) -> String {
        format!("--unshare-{}", self.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "all" => Self::All,
            "user" => Self::User,
            "user-try" => Self::UserTry,
            "ipc" => Self::Ipc,
            "pid" => Self::Pid,
            "net" => Self::Net,
            "uts" => Self::Uts,
            "cgroup" => Self::Cgroup,
            "cgroup-try" => Self::CgroupTry,
            other => {
                return Err(DirectiveError::UnknownNamespace {
                    name: other.to_string(),
                });
            }
        })
    }
}

/// Namespace and environment directives.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    unshares: Vec<Namespace>,
    share_net: bool,
    env_vars: Vec<(String, String)>,
    unset_vars: Vec<String>,
    uid: Option<u32>,
    gid: Option<u32>,
    hostname: Option<String>,
}

impl Environment {
    /// Creates an environment that shares every namespace with the host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unshares `namespace` from the host.
    ///
    /// Unsharing [`Namespace::All`] replaces any individual namespaces
    /// requested earlier. Once `all` is set, further individual requests are
    /// ignored. Repeated requests are emitted once.
    pub fn add_unshare(&mut self, namespace: Namespace) {
        if namespace == Namespace::All {
            if !self.unshares.is_empty() && self.unshares != [Namespace::All] {
                debug!(replaced = ?self.unshares, "Collapsing unshares into all");
            }
            self.unshares = vec![Namespace::All];
        } else if self.unshares.contains(&Namespace::All) {
            trace!(%namespace, "Already unsharing all namespaces");
        } else if !self.unshares.contains(&namespace) {
            self.unshares.push(namespace);
        }
    }

    /// Parses `name` and unshares it.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::UnknownNamespace` if `name` is not a namespace
    /// bwrap knows.
    pub fn add_unshare_named(&mut self, name: &str) -> Result<(), DirectiveError> {
        let namespace = name.parse::<Namespace>().inspect_err(|e| {
            warn!(error = %e, "Ignoring unshare request");
        })?;
        self.add_unshare(namespace);
        Ok(())
    }

    /// Returns `true` if `namespace` is unshared, directly or through `all`.
    #[must_use]
    pub fn is_unshared(&self, namespace: Namespace) -> bool {
        self.unshares.contains(&Namespace::All) || self.unshares.contains(&namespace)
    }

    /// Namespaces that will be unshared, in emission order.
    #[must_use]
    pub fn unshares(&self) -> &[Namespace] {
        &self.unshares
    }

    /// Keeps the network namespace shared despite `--unshare-all`.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::NamespaceRequired` unless `all` is unshared.
    pub fn add_share_net(&mut self) -> Result<(), DirectiveError> {
        if !self.unshares.contains(&Namespace::All) {
            return Err(rejected("--share-net", "all"));
        }
        self.share_net = true;
        Ok(())
    }

    /// Sets `var` to `val` inside the sandbox. Setting the same variable
    /// again replaces the earlier value in place.
    pub fn set_env(&mut self, var: impl Into<String>, val: impl Into<String>) {
        let (var, val) = (var.into(), val.into());
        match self.env_vars.iter_mut().find(|(name, _)| *name == var) {
            Some((_, existing)) => *existing = val,
            None => self.env_vars.push((var, val)),
        }
    }

    /// Unsets `var` inside the sandbox.
    pub fn unset_env(&mut self, var: impl Into<String>) {
        self.unset_vars.push(var.into());
    }

    /// Runs the child as `uid`.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::NamespaceRequired` unless a user namespace is
    /// unshared.
    pub fn set_uid(&mut self, uid: u32) -> Result<(), DirectiveError> {
        if !self.has_user_namespace() {
            return Err(rejected("--uid", "user"));
        }
        self.uid = Some(uid);
        Ok(())
    }

    /// Runs the child with group `gid`.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::NamespaceRequired` unless a user namespace is
    /// unshared.
    pub fn set_gid(&mut self, gid: u32) -> Result<(), DirectiveError> {
        if !self.has_user_namespace() {
            return Err(rejected("--gid", "user"));
        }
        self.gid = Some(gid);
        Ok(())
    }

    /// Sets the hostname seen inside the sandbox.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::NamespaceRequired` unless the UTS namespace
    /// is unshared.
    pub fn set_hostname(&mut self, hostname: impl Into<String>) -> Result<(), DirectiveError> {
        if !self.is_unshared(Namespace::Uts) {
            return Err(rejected("--hostname", "uts"));
        }
        self.hostname = Some(hostname.into());
        Ok(())
    }

    fn has_user_namespace(&self) -> bool {
        self.is_unshared(Namespace::User) || self.unshares.contains(&Namespace::UserTry)
    }

    /// Appends unshares, `--share-net`, env changes, uid and gid.
    pub(crate) fn push_namespace_args(&self, args: &mut Vec<String>) {
        args.extend(self.unshares.iter().map(|ns| ns.flag()));
        if self.share_net {
            args.push("--share-net".to_string());
        }
        for (var, val) in &self.env_vars {
            args.extend(["--setenv".to_string(), var.clone(), val.clone()]);
        }
        for var in &self.unset_vars {
            args.extend(["--unsetenv".to_string(), var.clone()]);
        }
        if let Some(uid) = self.uid {
            args.extend(["--uid".to_string(), uid.to_string()]);
        }
        if let Some(gid) = self.gid {
            args.extend(["--gid".to_string(), gid.to_string()]);
        }
    }

    /// Appends `--hostname`. It follows `--chdir` on the command line.
    pub(crate) fn push_hostname_args(&self, args: &mut Vec<String>) {
        if let Some(hostname) = &self.hostname {
            args.extend(["--hostname".to_string(), hostname.clone()]);
        }
    }

    /// Generates this section's arguments on their own.
    #[must_use]
    pub fn gen_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        self.push_namespace_args(&mut args);
        self.push_hostname_args(&mut args);
        args
    }
}

fn rejected(directive: &'static str, required: &'static str) -> DirectiveError {
    let err = DirectiveError::NamespaceRequired {
        directive,
        required,
    };
    warn!(error = %err, "Rejecting directive");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_names_round_trip() {
        for name in [
            "all", "user", "user-try", "ipc", "pid", "net", "uts", "cgroup", "cgroup-try",
        ] {
            let ns: Namespace = name.parse().unwrap();
            assert_eq!(ns.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_namespace_rejected() {
        let mut env = Environment::new();
        let result = env.add_unshare_named("mount");

        assert!(matches!(
            result,
            Err(DirectiveError::UnknownNamespace { ref name }) if name == "mount"
        ));
        assert!(env.gen_args().is_empty());
    }

    #[test]
    fn test_all_replaces_individual_unshares() {
        let mut env = Environment::new();
        env.add_unshare(Namespace::Net);
        env.add_unshare(Namespace::Pid);
        env.add_unshare(Namespace::All);

        assert_eq!(env.unshares(), &[Namespace::All]);
    }

    #[test]
    fn test_individual_after_all_is_ignored() {
        let mut env = Environment::new();
        env.add_unshare(Namespace::All);
        env.add_unshare(Namespace::Ipc);

        assert_eq!(env.gen_args(), vec!["--unshare-all"]);
        assert!(env.is_unshared(Namespace::Ipc));
    }

    #[test]
    fn test_repeated_unshare_emitted_once() {
        let mut env = Environment::new();
        env.add_unshare(Namespace::Net);
        env.add_unshare(Namespace::Net);

        assert_eq!(env.gen_args(), vec!["--unshare-net"]);
    }

    #[test]
    fn test_share_net_requires_all() {
        let mut env = Environment::new();
        env.add_unshare(Namespace::Net);
        assert!(env.add_share_net().is_err());

        env.add_unshare(Namespace::All);
        env.add_share_net().unwrap();
        assert_eq!(env.gen_args(), vec!["--unshare-all", "--share-net"]);
    }

    #[test]
    fn test_uid_gid_require_user_namespace() {
        let mut env = Environment::new();
        assert!(matches!(
            env.set_uid(1001),
            Err(DirectiveError::NamespaceRequired {
                directive: "--uid",
                ..
            })
        ));
        assert!(env.set_gid(1001).is_err());
        assert!(env.gen_args().is_empty());

        env.add_unshare(Namespace::UserTry);
        env.set_uid(1001).unwrap();
        env.set_gid(1002).unwrap();
        assert_eq!(
            env.gen_args(),
            vec!["--unshare-user-try", "--uid", "1001", "--gid", "1002"]
        );
    }

    #[test]
    fn test_hostname_requires_uts() {
        let mut env = Environment::new();
        env.add_unshare(Namespace::User);
        assert!(env.set_hostname("box").is_err());

        env.add_unshare(Namespace::Uts);
        env.set_hostname("box").unwrap();
        assert_eq!(
            env.gen_args(),
            vec!["--unshare-user", "--unshare-uts", "--hostname", "box"]
        );
    }

    #[test]
    fn test_set_env_replaces_in_place() {
        let mut env = Environment::new();
        env.set_env("PATH", "/bin");
        env.set_env("LANG", "C");
        env.set_env("PATH", "/usr/bin");
        env.unset_env("HOME");

        assert_eq!(
            env.gen_args(),
            vec![
                "--setenv", "PATH", "/usr/bin", "--setenv", "LANG", "C", "--unsetenv", "HOME"
            ]
        );
    }
}
