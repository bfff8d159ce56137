use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ProgramType {
    Ccm => "CCM",
    Pcm => "PCM",
    Bhi => "BHI",
    Rpm => "RPM",
    Rtm => "RTM",
    Apcm => "APCM",
    Cccm => "CCCM",
    Cco => "CCO",
    Awv => "AWV",
});

str_enum!(PracticeStatus {
    Active => "active",
    Inactive => "inactive",
});

str_enum!(RunStatus {
    Running => "running",
    Completed => "completed",
    Error => "error",
});

str_enum!(RunKind {
    Monthly => "monthly",
    Backfill => "backfill",
});

/// Programs that cannot be billed for the same patient in the same month.
/// Ordered by resolution priority, highest first.
pub const EXCLUSIVE_PROGRAMS: [ProgramType; 4] = [
    ProgramType::Pcm,
    ProgramType::Apcm,
    ProgramType::Cccm,
    ProgramType::Ccm,
];

impl ProgramType {
    pub fn all() -> &'static [ProgramType] {
        &[
            Self::Ccm,
            Self::Pcm,
            Self::Bhi,
            Self::Rpm,
            Self::Rtm,
            Self::Apcm,
            Self::Cccm,
            Self::Cco,
            Self::Awv,
        ]
    }

    /// Parse a program code as sent by the remote platform (any case, padded).
    pub fn from_code(code: &str) -> Option<Self> {
        code.trim().to_ascii_uppercase().parse().ok()
    }

    pub fn is_exclusive(&self) -> bool {
        EXCLUSIVE_PROGRAMS.contains(self)
    }

    /// Programs whose missing minutes are taken from the patient's CCM minutes.
    pub fn shares_ccm_minutes(&self) -> bool {
        matches!(self, Self::Pcm | Self::Cccm | Self::Apcm)
    }
}
