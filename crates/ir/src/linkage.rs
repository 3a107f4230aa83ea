use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Linkage of symbols.
pub enum Linkage {
    /// The symbol is defined in the module, and can be used from the outside of the module.
    Public,

    #[default]
    /// The symbol is defined in the module, and can NOT be called from another module.
    Private,

    /// The symbol is defined outside of the module.
    External,

    /// The symbol is defined in the module, but the definition may be replaced
    /// by another one at link time.
    Weak,
}

impl Linkage {
    /// Returns `true` if the definition seen in this module may not be the one
    /// used at runtime.
    pub fn is_interposable(self) -> bool {
        matches!(self, Self::Weak)
    }

    pub fn is_local(self) -> bool {
        matches!(self, Self::Private)
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Private => write!(f, "private"),
            Self::External => write!(f, "external"),
            Self::Weak => write!(f, "weak"),
        }
    }
}

impl FromStr for Linkage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "external" => Ok(Self::External),
            "weak" => Ok(Self::Weak),
            _ => Err(()),
        }
    }
}
