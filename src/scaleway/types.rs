//! Newtypes for Scaleway lifecycle values to avoid stringly-typed code.

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub(crate) struct $name(String);

        impl $name {
            pub(crate) const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

newtype!(
    /// Server identifier.
    InstanceId
);
newtype!(
    /// Availability zone such as `fr-par-1`.
    Zone
);
newtype!(
    /// Raw server state reported by the API (`running`, `stopped`, ...).
    InstanceState
);
newtype!(
    /// Server action name such as `poweron` or `terminate`.
    Action
);

impl InstanceState {
    pub(crate) fn is_running(&self) -> bool {
        self.as_str() == "running"
    }
}

impl Action {
    pub(crate) const POWER_ON: &'static str = "poweron";
    pub(crate) const TERMINATE: &'static str = "terminate";

    pub(crate) fn is(&self, name: &str) -> bool {
        self.as_str() == name
    }
}
