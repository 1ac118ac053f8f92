//! Packet data over the modem's ECM interface.
//!
//! The modem does the PDP activation itself (`AT#ECM`); the host side only
//! needs a DHCP client on the USB network interface, which is started and
//! stopped through service control properties.

use secrecy::SecretString;
use tracing::{debug, error, info, warn};

use super::{Checked as _, HandlerResult, expect_ok, tokens};
use crate::{
    at::timeout::AtTimeout,
    context::Context,
    env::{RilError, Unsolicited},
    modem::ModemModel,
    properties::{CLEAN_SERVICE, CTL_START, DHCP_SERVICE, start_service, stop_service},
    request::{AttachApn, DataCall, DataProfile, Response},
    session::AttachConfig,
};

const ECM_INTERFACE: &str = "wwan0";
const DEFAULT_PROTOCOL: &str = "IP";

fn define_context(ctx: &Context, protocol: &str, apn: &str) -> Result<(), RilError> {
    let command = format!("AT+CGDCONT=1,\"{protocol}\",\"{apn}\",,0,0");
    ctx.command(&command, AtTimeout::Normal).checked()?;

    Ok(())
}

pub fn set_initial_attach_apn(ctx: &Context, apn: AttachApn) -> HandlerResult {
    ctx.session.set_attach_config(None);
    let Some(name) = apn.apn else {
        return Err(RilError::GenericFailure);
    };
    let protocol = apn
        .protocol
        .filter(|protocol| !protocol.is_empty())
        .unwrap_or_else(|| DEFAULT_PROTOCOL.to_owned());

    define_context(ctx, &protocol, &name)?;

    let (user, password) = if apn.auth_type > 0 {
        (apn.user, apn.password.map(SecretString::new))
    } else {
        (None, None)
    };
    info!(apn = %name, %protocol, "initial attach APN configured");
    ctx.session.set_attach_config(Some(AttachConfig {
        apn: name,
        protocol,
        auth_type: apn.auth_type,
        user,
        password,
    }));

    Ok(Response::Empty)
}

/// Credentials and APN of a call, with the attach configuration filling in
/// for a profile that has no APN of its own.
struct Connection {
    apn: String,
    protocol: String,
    auth_type: i32,
    user: Option<String>,
    password: Option<String>,
}

impl Connection {
    fn resolve(ctx: &Context, profile: DataProfile) -> Result<Self, RilError> {
        let protocol = |p: Option<String>| {
            p.filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_owned())
        };

        if let Some(apn) = profile.apn.filter(|apn| !apn.is_empty()) {
            return Ok(Self {
                apn,
                protocol: protocol(profile.protocol),
                auth_type: profile.auth_type.max(0),
                user: profile.user,
                password: profile.password,
            });
        }

        ctx.session
            .with_attach_config(|config| Self {
                apn: config.apn.clone(),
                protocol: config.protocol.clone(),
                auth_type: config.auth_type.max(0),
                user: config.user.clone(),
                password: config.password().map(str::to_owned),
            })
            .ok_or_else(|| {
                warn!("data call without APN and no attach APN configured");
                RilError::GenericFailure
            })
    }

    fn ecm_command(&self) -> String {
        let user = self.user.as_deref().unwrap_or_default();
        match (self.auth_type, &self.password) {
            (0, _) => "AT#ECM=1,0".to_owned(),
            (_, Some(password)) => format!("AT#ECM=1,0,\"{user}\",\"{password}\",1"),
            (_, None) => format!("AT#ECM=1,0,\"{user}\""),
        }
    }
}

/// Whether an ECM session is currently up, from `AT#ECM?`.
fn ecm_connected(ctx: &Context) -> Result<bool, RilError> {
    let response = ctx
        .singleline("AT#ECM?", "#ECM:", AtTimeout::Ecm)
        .checked()?;
    let mut tok = response.tokens()?;
    let _cid = tok.next_int()?;

    Ok(tok.next_int()? == 1)
}

pub fn setup_data_call(ctx: &Context, profile: DataProfile) -> HandlerResult {
    let connection = Connection::resolve(ctx, profile)?;

    let result = connect(ctx, &connection);
    if result.is_err() {
        stop_service(&*ctx.properties, DHCP_SERVICE);
        start_service(&*ctx.properties, CLEAN_SERVICE);
    }

    result
}

fn connect(ctx: &Context, connection: &Connection) -> HandlerResult {
    // Context definition and QoS defaults are best effort.
    for command in [
        format!(
            "AT+CGDCONT=1,\"{}\",\"{}\",,0,0",
            connection.protocol, connection.apn
        ),
        "AT+CGQREQ=1".to_owned(),
        "AT+CGQMIN=1".to_owned(),
        "AT+CGEREP=1,0".to_owned(),
    ] {
        let response = ctx.command(&command, AtTimeout::Normal)?;
        if !response.success {
            debug!("{command} failed with {}", response.final_response);
        }
    }

    if ecm_connected(ctx)? {
        info!("tearing down stale ECM session");
        ctx.command("AT#ECMD=0", AtTimeout::Ecm)?;
        ctx.sleep(ctx.timings.ecm_teardown);
    }

    stop_service(&*ctx.properties, CLEAN_SERVICE);
    ctx.properties
        .set(CTL_START, DHCP_SERVICE)
        .map_err(|e| {
            error!("failed to start DHCP client: {e:?}");
            RilError::GenericFailure
        })?;
    // The DHCP client and the modem need a moment to line up.
    ctx.sleep(ctx.timings.dhcp_helper);

    ctx.command(&connection.ecm_command(), AtTimeout::Ecm)
        .checked()?;
    info!(apn = %connection.apn, "data call connected");

    match read_data_call(ctx)? {
        Some(call) => Ok(Response::DataCalls(vec![call])),
        None => Err(RilError::GenericFailure),
    }
}

pub fn deactivate_data_call(ctx: &Context) -> HandlerResult {
    stop_service(&*ctx.properties, DHCP_SERVICE);
    start_service(&*ctx.properties, CLEAN_SERVICE);

    if ecm_connected(ctx)? {
        expect_ok(ctx.command("AT#ECMD=0", AtTimeout::Ecm))?;
    }
    info!("data call deactivated");

    Ok(Response::Empty)
}

pub fn data_call_list(ctx: &Context) -> HandlerResult {
    let calls = read_data_call(ctx)?.into_iter().collect();
    Ok(Response::DataCalls(calls))
}

/// Re-reads the data call list and reports it unsolicited. Any failure is
/// reported as an empty list.
pub fn refresh_data_call_list(ctx: &Context) {
    let calls = match read_data_call(ctx) {
        Ok(call) => call.into_iter().collect(),
        Err(e) => {
            warn!("failed to read data call list: {e}");
            Vec::new()
        }
    };

    ctx.session.raise(Unsolicited::DataCallListChanged(calls));
}

fn read_data_call(ctx: &Context) -> Result<Option<DataCall>, RilError> {
    let model = ctx.session.model();
    let command = if model.is_lte() && ctx.session.quirks().ecmc {
        "ATE1;#ECMC?;E0"
    } else {
        "AT#ECMC?"
    };
    let response = ctx
        .singleline(command, "#ECMC:", AtTimeout::Ecm)
        .checked()?;

    parse_ecmc(response.line()?, model)
}

/// Parses `#ECMC: <cid>,<state>,"ip","mask","gw","dns1","dns2"`. LTE modules
/// report both DNS servers in one comma separated field.
fn parse_ecmc(line: &str, model: ModemModel) -> Result<Option<DataCall>, RilError> {
    let mut tok = tokens(line)?;
    let _cid = tok.next_int()?;
    if tok.next_int()? == 0 {
        return Ok(None);
    }

    let addresses = tok.next_str()?.to_owned();
    let _netmask = tok.next_str()?;
    let gateways = tok.next_str()?.to_owned();
    let dns1 = tok.next_str()?;
    let dnses = if model.is_lte() {
        dns1.replacen(',', " ", 1)
    } else {
        format!("{dns1} {}", tok.next_str()?)
    };

    Ok(Some(DataCall {
        status: 0,
        cid: 1,
        active: 2,
        protocol: "IPV4V6".to_owned(),
        ifname: ECM_INTERFACE.to_owned(),
        addresses,
        dnses,
        gateways,
    }))
}
