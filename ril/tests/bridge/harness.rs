use std::{
    collections::HashMap,
    io::{Read as _, Write as _},
    os::unix::net::{UnixListener, UnixStream},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use orb_ril::{
    Ril, RilConfig,
    at::port::Endpoint,
    config::Timings,
    env::{RilEnvironment, RilError, Token, Unsolicited},
    properties::Properties,
    radio::RadioState,
    request::{Request, Response},
};
use tempfile::TempDir;

const CTRL_Z: u8 = 0x1A;
const DEADLINE: Duration = Duration::from_secs(10);

/// Command timeout of the simulated modem.
pub const AT_TIMEOUT: Duration = Duration::from_millis(300);

mockall::mock! {
    pub Props {}

    impl Properties for Props {
        fn set(&self, key: &str, value: &str) -> eyre::Result<()>;
    }
}

/// Accepts any property write.
pub fn permissive_props() -> MockProps {
    let mut props = MockProps::new();
    props.expect_set().returning(|_, _| Ok(()));
    props
}

pub fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + DEADLINE;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    /// Lines written back, each terminated by CRLF.
    Lines(String),
    /// Nothing at all, the command times out.
    Silent,
    /// Answers with the SMS prompt, swallows the PDU, then writes the lines.
    Prompt(String),
}

impl Reply {
    pub fn lines(lines: &[&str]) -> Self {
        Self::Lines(lines.join("\n"))
    }
}

fn encode(lines: &str) -> Vec<u8> {
    lines
        .lines()
        .flat_map(|line| format!("{line}\r\n").into_bytes())
        .collect()
}

#[derive(Default)]
struct ModemState {
    script: HashMap<String, Reply>,
    received: Vec<String>,
    connections: Vec<UnixStream>,
}

/// A Telit modem simulated behind a UNIX domain socket. Unscripted commands
/// are answered with `OK`.
pub struct FakeModem {
    dir: TempDir,
    state: Arc<Mutex<ModemState>>,
}

impl FakeModem {
    pub fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let listener = UnixListener::bind(dir.path().join("modem.sock")).unwrap();
        let state = Arc::new(Mutex::new(ModemState::default()));

        let modem = Self { dir, state };
        modem.script("AT#CGMR", Reply::lines(&["#CGMR: 12.00.024-B003", "OK"]));
        modem.script("AT#CGMM", Reply::lines(&["#CGMM: HE910", "OK"]));

        let state = Arc::clone(&modem.state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let writer = stream.try_clone().unwrap();
                state.lock().unwrap().connections.push(writer);
                let state = Arc::clone(&state);
                thread::spawn(move || serve(&state, stream));
            }
        });

        modem
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::LocalSocket(self.dir.path().join("modem.sock"))
    }

    pub fn script(&self, command: &str, reply: Reply) {
        self.state
            .lock()
            .unwrap()
            .script
            .insert(command.to_owned(), reply);
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.received().iter().filter(|c| *c == command).count()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections.len()
    }

    /// Writes unsolicited lines on the most recent connection.
    pub fn unsolicited(&self, lines: &str) {
        let mut state = self.state.lock().unwrap();
        let stream = state.connections.last_mut().unwrap();
        stream.write_all(&encode(lines)).unwrap();
    }
}

fn read_command(stream: &mut UnixStream) -> Option<String> {
    let mut out = Vec::new();
    let mut byte = [0u8];
    loop {
        if stream.read(&mut byte).ok()? == 0 {
            return None;
        }
        if byte[0] == b'\r' || byte[0] == CTRL_Z {
            break;
        }
        out.push(byte[0]);
    }

    String::from_utf8(out).ok()
}

fn serve(state: &Mutex<ModemState>, mut stream: UnixStream) {
    while let Some(command) = read_command(&mut stream) {
        let reply = {
            let mut state = state.lock().unwrap();
            state.received.push(command.clone());
            state.script.get(&command).cloned()
        };
        let written = match reply.unwrap_or_else(|| Reply::Lines("OK".to_owned())) {
            Reply::Lines(lines) => stream.write_all(&encode(&lines)),
            Reply::Silent => Ok(()),
            Reply::Prompt(lines) => {
                if stream.write_all(b"> ").is_err() {
                    return;
                }
                let Some(pdu) = read_command(&mut stream) else {
                    return;
                };
                state.lock().unwrap().received.push(pdu);
                stream.write_all(&encode(&lines))
            }
        };
        if written.is_err() {
            return;
        }
    }
}

/// Keeps every completion and event it is handed.
#[derive(Default)]
pub struct RecordingEnv {
    completions: Mutex<HashMap<Token, Result<Response, RilError>>>,
    events: Mutex<Vec<Unsolicited>>,
}

impl RilEnvironment for RecordingEnv {
    fn complete_request(&self, token: Token, result: Result<Response, RilError>) {
        let previous = self.completions.lock().unwrap().insert(token, result);
        assert!(previous.is_none(), "request {token} completed twice");
    }

    fn raise_unsolicited(&self, event: Unsolicited) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingEnv {
    pub fn completion(&self, token: Token) -> Result<Response, RilError> {
        eventually(&format!("completion of {token}"), || {
            self.completions.lock().unwrap().contains_key(&token)
        });
        self.completions.lock().unwrap().remove(&token).unwrap()
    }

    pub fn events(&self) -> Vec<Unsolicited> {
        self.events.lock().unwrap().clone()
    }

    pub fn wait_for(&self, event: &Unsolicited) {
        eventually(&format!("{event:?}"), || self.events().contains(event));
    }

    /// Waits for the `nth` occurrence, counting from one.
    pub fn wait_for_nth(&self, event: &Unsolicited, nth: usize) {
        eventually(&format!("{event:?} #{nth}"), || {
            self.events().iter().filter(|e| *e == event).count() >= nth
        });
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}

pub struct Bridge {
    pub ril: Ril,
    pub env: Arc<RecordingEnv>,
    pub modem: FakeModem,
}

impl Bridge {
    /// Starts a bridge and waits for bring-up to leave the radio off.
    pub fn start(modem: FakeModem, props: MockProps) -> Self {
        let env = Arc::new(RecordingEnv::default());
        let config = RilConfig::builder()
            .env(Arc::clone(&env) as Arc<dyn RilEnvironment>)
            .endpoint(modem.endpoint())
            .properties(Box::new(props))
            .timings(Timings::immediate(AT_TIMEOUT))
            .build();
        let ril = Ril::start(config).unwrap();
        env.wait_for(&Unsolicited::RadioStateChanged(RadioState::Off));
        // Bring-up is done once its last command went out.
        eventually("bring-up", || modem.count("AT+CGREG=2") >= 1);

        Self { ril, env, modem }
    }

    pub fn request(&self, token: Token, request: Request) -> Result<Response, RilError> {
        self.ril.on_request(request, token);
        self.env.completion(token)
    }

    pub fn radio_on(&self) {
        let result = self.request(u64::MAX, Request::RadioPower { on: true });
        assert!(matches!(result, Ok(Response::Empty)), "{result:?}");
        assert_eq!(self.ril.current_state(), RadioState::On);
    }
}
