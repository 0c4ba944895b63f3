//! Android ABI names.

/// Android ABI a native library is built for.
///
/// The architecture decides where a `.so` lands inside the final package
/// (`lib/<abi>/`) and which NDK output directory it is read from.
///
/// # Example
///
/// ```
/// use apkpipe_schema::Arch;
///
/// assert_eq!(Arch::from_classifier("armeabi-v7a-debug"), Some(Arch::ArmeabiV7a));
/// assert_eq!(Arch::from_classifier("armeabi"), Some(Arch::Armeabi));
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    Default,
)]
pub enum Arch {
    /// Legacy 32-bit ARM (`armeabi`). Used when nothing more specific is known.
    #[default]
    #[serde(rename = "armeabi")]
    Armeabi,
    /// 32-bit ARM with hardware floating point (`armeabi-v7a`).
    #[serde(rename = "armeabi-v7a")]
    ArmeabiV7a,
    /// 64-bit ARM (`arm64-v8a`).
    #[serde(rename = "arm64-v8a")]
    Arm64V8a,
    /// 32-bit Intel (`x86`).
    #[serde(rename = "x86")]
    X86,
    /// 64-bit Intel (`x86_64`).
    #[serde(rename = "x86_64")]
    X86_64,
    /// 32-bit MIPS (`mips`).
    #[serde(rename = "mips")]
    Mips,
    /// 64-bit MIPS (`mips64`).
    #[serde(rename = "mips64")]
    Mips64,
}

impl Arch {
    /// Every ABI the NDK can target, in declaration order.
    pub const ALL: [Arch; 7] = [
        Self::Armeabi,
        Self::ArmeabiV7a,
        Self::Arm64V8a,
        Self::X86,
        Self::X86_64,
        Self::Mips,
        Self::Mips64,
    ];

    /// ABI directory name as used by the NDK and inside `lib/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Armeabi => "armeabi",
            Self::ArmeabiV7a => "armeabi-v7a",
            Self::Arm64V8a => "arm64-v8a",
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Mips => "mips",
            Self::Mips64 => "mips64",
        }
    }

    /// Derive the ABI from an artifact classifier such as `armeabi-v7a` or
    /// `x86_64-release`.
    ///
    /// Several ABI names are prefixes of others (`armeabi` / `armeabi-v7a`,
    /// `x86` / `x86_64`, `mips` / `mips64`), so the longest matching name wins.
    pub fn from_classifier(classifier: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .filter(|arch| classifier.starts_with(arch.as_str()))
            .max_by_key(|arch| arch.as_str().len())
            .copied()
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|arch| arch.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown architecture: {s}"))
    }
}
