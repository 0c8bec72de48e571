//! Telnet framing for the bundled line transport
//!
//! The decoder strips IAC command sequences out of the inbound stream and
//! reports them as events; the encoder escapes IAC bytes in outbound data.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const CR: u8 = b'\r';

/// Echo option
pub const OPT_ECHO: u8 = 1;
/// Suppress go-ahead option
pub const OPT_SGA: u8 = 3;
/// Negotiate about window size option
pub const OPT_NAWS: u8 = 31;

/// Maximum subnegotiation payload kept in memory
const MAX_SUBNEGOTIATION: usize = 1024;

/// Telnet codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subnegotiation too large: more than {max} bytes")]
    SubnegotiationTooLarge { max: usize },
}

/// Option negotiation verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Will,
    Wont,
    Do,
    Dont,
}

impl Negotiation {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            WILL => Some(Self::Will),
            WONT => Some(Self::Wont),
            DO => Some(Self::Do),
            DONT => Some(Self::Dont),
            _ => None,
        }
    }
}

/// Decoded inbound item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// User bytes with telnet escapes removed
    Data(Bytes),
    /// NAWS report from the client
    WindowSize { cols: u16, rows: u16 },
    /// Option negotiation
    Negotiation { verb: Negotiation, option: u8 },
    /// Any other two-byte command (NOP, AYT, ...)
    Command(u8),
    /// Subnegotiation for an option other than NAWS
    Subnegotiation { option: u8, data: Bytes },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Negotiate(Negotiation),
    SubOption,
    Sub(u8),
    SubIac(u8),
}

/// Codec for the telnet line transport
#[derive(Debug)]
pub struct TelnetCodec {
    state: State,
    /// Previous data byte was CR
    after_cr: bool,
    data: BytesMut,
    sub: BytesMut,
    ready: VecDeque<TelnetEvent>,
}

impl TelnetCodec {
    pub fn new() -> Self {
        Self {
            state: State::Data,
            after_cr: false,
            data: BytesMut::new(),
            sub: BytesMut::new(),
            ready: VecDeque::new(),
        }
    }

    fn flush_data(&mut self) {
        if !self.data.is_empty() {
            let chunk = self.data.split().freeze();
            self.ready.push_back(TelnetEvent::Data(chunk));
        }
    }

    fn emit(&mut self, event: TelnetEvent) {
        self.flush_data();
        self.ready.push_back(event);
    }

    fn finish_subnegotiation(&mut self, option: u8) {
        let data = self.sub.split().freeze();
        if option == OPT_NAWS && data.len() >= 4 {
            let cols = u16::from_be_bytes([data[0], data[1]]);
            let rows = u16::from_be_bytes([data[2], data[3]]);
            self.emit(TelnetEvent::WindowSize { cols, rows });
        } else {
            self.emit(TelnetEvent::Subnegotiation { option, data });
        }
    }

    fn push_data(&mut self, b: u8) {
        // CR NUL is a bare carriage return on the wire
        if self.after_cr && b == 0 {
            self.after_cr = false;
            return;
        }
        self.after_cr = b == CR;
        self.data.put_u8(b);
    }

    fn step(&mut self, b: u8) -> Result<(), CodecError> {
        let state = self.state;
        self.state = match state {
            State::Data => {
                if b == IAC {
                    State::Iac
                } else {
                    self.push_data(b);
                    State::Data
                }
            }
            State::Iac => match b {
                IAC => {
                    self.push_data(IAC);
                    State::Data
                }
                SB => State::SubOption,
                other => match Negotiation::from_byte(other) {
                    Some(verb) => State::Negotiate(verb),
                    None => {
                        self.emit(TelnetEvent::Command(other));
                        State::Data
                    }
                },
            },
            State::Negotiate(verb) => {
                self.emit(TelnetEvent::Negotiation { verb, option: b });
                State::Data
            }
            State::SubOption => {
                self.sub.clear();
                State::Sub(b)
            }
            State::Sub(option) => {
                if b == IAC {
                    State::SubIac(option)
                } else {
                    if self.sub.len() >= MAX_SUBNEGOTIATION {
                        self.state = State::Data;
                        self.sub.clear();
                        return Err(CodecError::SubnegotiationTooLarge {
                            max: MAX_SUBNEGOTIATION,
                        });
                    }
                    self.sub.put_u8(b);
                    State::Sub(option)
                }
            }
            State::SubIac(option) => match b {
                SE => {
                    self.finish_subnegotiation(option);
                    State::Data
                }
                IAC => {
                    self.sub.put_u8(IAC);
                    State::Sub(option)
                }
                // Malformed; drop the subnegotiation
                _ => {
                    self.sub.clear();
                    State::Data
                }
            },
        };
        Ok(())
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(event) = self.ready.pop_front() {
            return Ok(Some(event));
        }

        let input = src.split();
        for &b in input.iter() {
            self.step(b)?;
        }
        self.flush_data();

        Ok(self.ready.pop_front())
    }
}

impl Encoder<Bytes> for TelnetCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        for &b in item.iter() {
            if b == IAC {
                dst.put_u8(IAC);
            }
            dst.put_u8(b);
        }
        Ok(())
    }
}

/// Negotiation sent when a connection opens: the server echoes, suppresses
/// go-ahead and asks the client to report its window size.
pub fn negotiation_preamble() -> Bytes {
    Bytes::from_static(&[
        IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA, IAC, DO, OPT_NAWS,
    ])
}
