use std::time::Duration;

/// Per command family response budgets, as measured on Telit xE910 modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtTimeout {
    Normal,
    Ccwa,
    Cfun,
    Cpbs,
    Cpbr,
    /// Network scans routinely take two minutes.
    Cops,
    Csca,
    Chld,
    Clip,
    Cpwd,
    Cpin,
    Clck,
    Ccfc,
    Clir,
    Cgatt,
    Dial,
    Hangup,
    Answer,
    Crsm,
    Cmgd,
    Cgact,
    Cmgw,
    Cmgs,
    Service,
    Ecm,
}

impl AtTimeout {
    pub const fn secs(self) -> u64 {
        match self {
            Self::Normal => 10,
            Self::Ccwa => 16,
            Self::Cfun => 15,
            Self::Cpbs => 6,
            Self::Cpbr => 16,
            Self::Cops => 121,
            Self::Csca => 6,
            Self::Chld => 31,
            Self::Clip => 16,
            Self::Cpwd => 16,
            Self::Cpin => 6,
            Self::Clck => 26,
            Self::Ccfc => 16,
            Self::Clir => 16,
            Self::Cgatt => 11,
            Self::Dial => 31,
            Self::Hangup => 31,
            Self::Answer => 31,
            Self::Crsm => 16,
            Self::Cmgd => 26,
            Self::Cgact => 151,
            Self::Cmgw => 8,
            Self::Cmgs => 62,
            Self::Service => 15,
            Self::Ecm => 90,
        }
    }
}

impl From<AtTimeout> for Duration {
    fn from(value: AtTimeout) -> Self {
        Duration::from_secs(value.secs())
    }
}
