use std::fmt::{Display, Formatter};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTriple {
    pub architecture: Architecture,
    pub vendor: Vendor,
    pub operating_system: OperatingSystem,
}

impl TargetTriple {
    pub fn new(architecture: Architecture, vendor: Vendor, operating_system: OperatingSystem) -> Self {
        Self {
            architecture,
            vendor,
            operating_system,
        }
    }

    pub fn parse(s: &str) -> Result<Self, InvalidTriple> {
        let mut triple = s.split('-');

        let arch = Architecture::parse(triple.next().ok_or(InvalidTriple::InvalidFormat(s))?)?;
        let vendor = Vendor::parse(triple.next().ok_or(InvalidTriple::InvalidFormat(s))?)?;
        let os = OperatingSystem::parse(triple.next().ok_or(InvalidTriple::InvalidFormat(s))?)?;

        if triple.next().is_some() {
            return Err(InvalidTriple::InvalidFormat(s));
        }

        if arch.is_wasm() != matches!(os, OperatingSystem::Unknown | OperatingSystem::Wasi) {
            return Err(InvalidTriple::InvalidCombination);
        }

        Ok(Self::new(arch, vendor, os))
    }

    /// Pointer width of the target in bits.
    pub fn pointer_width(&self) -> u32 {
        self.architecture.pointer_width()
    }
}

impl Display for TargetTriple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.architecture, self.vendor, self.operating_system
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
    Aarch64,
    Riscv32,
    Riscv64,
    Wasm32,
}

impl Architecture {
    fn parse(s: &str) -> Result<Self, InvalidTriple> {
        match s {
            "x86_64" => Ok(Self::X86_64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "riscv32" => Ok(Self::Riscv32),
            "riscv64" => Ok(Self::Riscv64),
            "wasm32" => Ok(Self::Wasm32),
            _ => Err(InvalidTriple::ArchitectureNotSupported),
        }
    }

    pub fn pointer_width(self) -> u32 {
        match self {
            Self::X86_64 | Self::Aarch64 | Self::Riscv64 => 64,
            Self::Riscv32 | Self::Wasm32 => 32,
        }
    }

    fn is_wasm(self) -> bool {
        matches!(self, Self::Wasm32)
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86_64 => write!(f, "x86_64"),
            Self::Aarch64 => write!(f, "aarch64"),
            Self::Riscv32 => write!(f, "riscv32"),
            Self::Riscv64 => write!(f, "riscv64"),
            Self::Wasm32 => write!(f, "wasm32"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Unknown,
    Apple,
    Pc,
}

impl Vendor {
    fn parse(s: &str) -> Result<Self, InvalidTriple> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "apple" => Ok(Self::Apple),
            "pc" => Ok(Self::Pc),
            _ => Err(InvalidTriple::VendorNotSupported),
        }
    }
}

impl Display for Vendor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Apple => write!(f, "apple"),
            Self::Pc => write!(f, "pc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    Linux,
    Darwin,
    Windows,
    Wasi,
    None,
    Unknown,
}

impl OperatingSystem {
    fn parse(s: &str) -> Result<Self, InvalidTriple> {
        match s {
            "linux" => Ok(Self::Linux),
            "darwin" => Ok(Self::Darwin),
            "windows" => Ok(Self::Windows),
            "wasi" => Ok(Self::Wasi),
            "none" => Ok(Self::None),
            "unknown" => Ok(Self::Unknown),
            _ => Err(InvalidTriple::OperatingSystemNotSupported),
        }
    }
}

impl Display for OperatingSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Darwin => write!(f, "darwin"),
            Self::Windows => write!(f, "windows"),
            Self::Wasi => write!(f, "wasi"),
            Self::None => write!(f, "none"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvalidTriple<'a> {
    #[error("the format of triple must be `architecture-vendor-os`: but got `{0}`")]
    InvalidFormat(&'a str),

    #[error("given architecture is not supported")]
    ArchitectureNotSupported,

    #[error("given vendor is not supported")]
    VendorNotSupported,

    #[error("given operating system is not supported")]
    OperatingSystemNotSupported,

    #[error("given triple consists of invalid combination")]
    InvalidCombination,
}
