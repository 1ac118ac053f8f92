//! Modem model detection and firmware quirks.

use derive_more::Display;
use serde::Serialize;
use tracing::{error, info};

use crate::at::tok::atoi;

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModemModel {
    #[default]
    #[display("HE910")]
    He910,
    #[display("UE910")]
    Ue910,
    #[display("LE910")]
    Le910,
    #[display("LE920")]
    Le920,
}

impl ModemModel {
    /// Matches the `AT#CGMM` answer, falling back to HE910.
    pub fn detect(reported: &str) -> Self {
        [Self::He910, Self::Ue910, Self::Le910, Self::Le920]
            .into_iter()
            .find(|model| reported.contains(&model.to_string()))
            .unwrap_or_default()
    }

    /// The LTE capable families, which need different command variants in a
    /// number of places.
    pub fn is_lte(self) -> bool {
        matches!(self, Self::Le910 | Self::Le920)
    }
}

/// Firmware specific workarounds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quirks {
    /// `+CGREG` does not report LTE registration; consult `+CEREG` too.
    pub cgreg_lte: bool,
    /// `AT#ECMC?` only answers with echo enabled.
    pub ecmc: bool,
}

/// Numbers out of a firmware string such as `17.01.521-B063`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: i32,
    pub minor: i32,
    pub eb: i32,
}

impl FirmwareVersion {
    pub fn parse(firmware: &str) -> Self {
        let mut dots = firmware.splitn(3, '.');
        let _platform = dots.next();
        let Some(major) = dots.next() else {
            error!("unexpected firmware version format: {firmware:?}");
            return Self::default();
        };
        let major = atoi(major);

        let Some(rest) = dots.next() else {
            return Self {
                major,
                ..Self::default()
            };
        };

        // The minor is what follows the first two digits of the third field.
        let minor_of = |tok: &str| atoi(tok.get(2..).unwrap_or_default());
        match rest.split_once('-') {
            Some((tok, build)) => {
                let eb = build
                    .find('B')
                    .or_else(|| build.find('A'))
                    .map_or(0, |at| atoi(&build[at + 1..]));
                Self {
                    major,
                    minor: minor_of(tok),
                    eb,
                }
            }
            None => Self {
                major,
                minor: minor_of(rest),
                eb: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModemIdentity {
    pub model: ModemModel,
    pub quirks: Quirks,
    pub reported_model: String,
    pub firmware: String,
}

impl ModemIdentity {
    pub fn identify(reported_model: &str, firmware: &str) -> Self {
        let model = ModemModel::detect(reported_model);
        let version = FirmwareVersion::parse(firmware);
        let mut quirks = Quirks::default();

        if model.is_lte() && version.major < 2 {
            let early_1_00 = version.major == 1 && version.minor == 0;
            quirks.cgreg_lte = version.major == 0 || (early_1_00 && version.eb < 61);
            quirks.ecmc = version.major == 0 || (early_1_00 && version.eb == 63);
        }

        info!(
            %model, ?version, ?quirks,
            "identified modem {reported_model:?} running {firmware:?}"
        );

        Self {
            model,
            quirks,
            reported_model: reported_model.to_owned(),
            firmware: firmware.to_owned(),
        }
    }
}

/// The bridge version string reported upstream.
pub fn version_string(identity: Option<&ModemIdentity>) -> String {
    let model = identity.map_or_else(|| "Unidentified modem".to_owned(), |id| id.model.to_string());

    format!("orb-ril {} - {model}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_detection() {
        assert_eq!(ModemModel::detect("LE910-EU1"), ModemModel::Le910);
        assert_eq!(ModemModel::detect("UE910-EUD"), ModemModel::Ue910);
        assert_eq!(ModemModel::detect("LE920-NA"), ModemModel::Le920);
        assert_eq!(ModemModel::detect("something else"), ModemModel::He910);
    }

    #[test]
    fn test_firmware_parsing() {
        assert_eq!(
            FirmwareVersion::parse("17.01.520-B063"),
            FirmwareVersion {
                major: 1,
                minor: 0,
                eb: 63
            }
        );
        assert_eq!(
            FirmwareVersion::parse("20.00.522"),
            FirmwareVersion {
                major: 0,
                minor: 2,
                eb: 0
            }
        );
        assert_eq!(
            FirmwareVersion::parse("17.01.521-A059"),
            FirmwareVersion {
                major: 1,
                minor: 1,
                eb: 59
            }
        );
        assert_eq!(FirmwareVersion::parse("17"), FirmwareVersion::default());
        assert_eq!(
            FirmwareVersion::parse("17.02"),
            FirmwareVersion {
                major: 2,
                minor: 0,
                eb: 0
            }
        );
    }

    #[test]
    fn test_quirk_table() {
        let quirks = |model, fw| ModemIdentity::identify(model, fw).quirks;

        let both = Quirks {
            cgreg_lte: true,
            ecmc: true,
        };
        assert_eq!(quirks("LE910", "17.00.520"), both);
        assert_eq!(
            quirks("LE910", "17.01.520-B060"),
            Quirks {
                cgreg_lte: true,
                ecmc: false
            }
        );
        assert_eq!(
            quirks("LE920", "17.01.520-B063"),
            Quirks {
                cgreg_lte: false,
                ecmc: true
            }
        );
        assert_eq!(quirks("LE910", "17.01.521-B063"), Quirks::default());
        assert_eq!(quirks("LE910", "17.02.520-B010"), Quirks::default());
        assert_eq!(quirks("HE910", "12.00.520"), Quirks::default());
    }

    #[test]
    fn test_version_string() {
        let id = ModemIdentity::identify("LE910", "17.02.520");
        assert!(version_string(Some(&id)).ends_with(" - LE910"));
        assert!(version_string(None).ends_with(" - Unidentified modem"));
    }
}
