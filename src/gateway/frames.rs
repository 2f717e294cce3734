//! Gateway wire shapes: opcodes, the frame envelope, and payload builders.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Gateway intent mask for basic guild/channel visibility. The bot needs
/// nothing beyond that: interactions arrive regardless of intents.
pub const INTENT_GUILDS: u64 = 1 << 0;

/// Gateway opcodes the bot sends or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Dispatch,
    Heartbeat,
    Identify,
    Resume,
    Reconnect,
    InvalidSession,
    Hello,
    HeartbeatAck,
}

impl Opcode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
        }
    }
}

/// The `{op, d, s, t}` envelope every gateway frame uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayFrame {
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.op)
    }
}

/// Hello payload carried by opcode 10.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

/// Ready payload carried by the READY dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub session_id: String,
    pub resume_gateway_url: String,
}

/// Build an identify frame carrying credentials and the minimal intent mask.
pub fn identify(token: &str) -> Value {
    json!({
        "op": Opcode::Identify.as_u8(),
        "d": {
            "token": token,
            "intents": INTENT_GUILDS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "trinketbot",
                "device": "trinketbot",
            },
        },
    })
}

/// Build a resume frame re-attaching an existing session.
pub fn resume(token: &str, session_id: &str, last_seq: u64) -> Value {
    json!({
        "op": Opcode::Resume.as_u8(),
        "d": {
            "token": token,
            "session_id": session_id,
            "seq": last_seq,
        },
    })
}

/// Build a heartbeat frame carrying the last seen sequence (null before
/// any dispatch has been seen).
pub fn heartbeat(last_seq: Option<u64>) -> Value {
    json!({
        "op": Opcode::Heartbeat.as_u8(),
        "d": last_seq,
    })
}
