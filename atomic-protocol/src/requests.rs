//! Session/channel request payloads
//!
//! Payload layouts follow the remote-shell connection protocol: strings
//! are a 4-byte big-endian length followed by the bytes, dimensions are
//! 4-byte big-endian integers.

use bytes::Buf;

/// Request payload error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("{kind} payload truncated: needed {needed} bytes, {available} available")]
    Truncated {
        kind: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{kind} payload contains invalid UTF-8")]
    InvalidUtf8 { kind: &'static str },

    #[error("{kind} request does not accept a payload ({len} bytes given)")]
    UnexpectedPayload { kind: &'static str, len: usize },
}

/// A parsed session/channel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequest {
    /// Initial terminal allocation with its size
    PtyReq { term: String, cols: u32, rows: u32 },
    /// Terminal resized
    WindowChange { cols: u32, rows: u32 },
    /// One environment variable
    Env { key: String, value: String },
    /// Start the interactive shell
    Shell,
    /// Named subsystem (never accepted)
    Subsystem { name: String },
    /// Anything else
    Other { kind: String },
}

impl ChannelRequest {
    /// Parse a request of the given kind from its raw payload
    pub fn parse(kind: &str, payload: &[u8]) -> Result<Self, RequestError> {
        let mut buf = payload;
        match kind {
            "pty-req" => {
                let term = read_string(&mut buf, "pty-req")?;
                let (cols, rows) = read_dims(&mut buf, "pty-req")?;
                Ok(Self::PtyReq { term, cols, rows })
            }
            "window-change" => {
                let (cols, rows) = read_dims(&mut buf, "window-change")?;
                Ok(Self::WindowChange { cols, rows })
            }
            "env" => {
                let key = read_string(&mut buf, "env")?;
                let value = read_string(&mut buf, "env")?;
                Ok(Self::Env { key, value })
            }
            "shell" => {
                if !payload.is_empty() {
                    return Err(RequestError::UnexpectedPayload {
                        kind: "shell",
                        len: payload.len(),
                    });
                }
                Ok(Self::Shell)
            }
            "subsystem" => {
                let name = read_string(&mut buf, "subsystem")?;
                Ok(Self::Subsystem { name })
            }
            other => Ok(Self::Other {
                kind: other.to_string(),
            }),
        }
    }

    /// Request kind as it appears on the wire
    pub fn kind(&self) -> &str {
        match self {
            Self::PtyReq { .. } => "pty-req",
            Self::WindowChange { .. } => "window-change",
            Self::Env { .. } => "env",
            Self::Shell => "shell",
            Self::Subsystem { .. } => "subsystem",
            Self::Other { kind } => kind,
        }
    }
}

fn ensure(buf: &[u8], needed: usize, kind: &'static str) -> Result<(), RequestError> {
    if buf.remaining() < needed {
        return Err(RequestError::Truncated {
            kind,
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn read_string(buf: &mut &[u8], kind: &'static str) -> Result<String, RequestError> {
    ensure(buf, 4, kind)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len, kind)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| RequestError::InvalidUtf8 { kind })
}

fn read_dims(buf: &mut &[u8], kind: &'static str) -> Result<(u32, u32), RequestError> {
    ensure(buf, 8, kind)?;
    let cols = buf.get_u32();
    let rows = buf.get_u32();
    Ok((cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Vec<u8> {
        let mut out = (s.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn dims(cols: u32, rows: u32) -> Vec<u8> {
        let mut out = cols.to_be_bytes().to_vec();
        out.extend_from_slice(&rows.to_be_bytes());
        out
    }

    #[test]
    fn test_parse_pty_req() {
        let mut payload = string("xterm-256color");
        payload.extend(dims(132, 43));
        // Pixel sizes and modes trail the dimensions
        payload.extend(dims(0, 0));
        payload.extend([0u8, 0, 0, 1, 0]);

        let req = ChannelRequest::parse("pty-req", &payload).unwrap();
        assert_eq!(
            req,
            ChannelRequest::PtyReq {
                term: "xterm-256color".into(),
                cols: 132,
                rows: 43,
            }
        );
        assert_eq!(req.kind(), "pty-req");
    }

    #[test]
    fn test_parse_pty_req_truncated() {
        let mut payload = string("vt100");
        payload.extend([0u8, 0, 0, 80]);

        let err = ChannelRequest::parse("pty-req", &payload).unwrap_err();
        assert_eq!(
            err,
            RequestError::Truncated {
                kind: "pty-req",
                needed: 8,
                available: 4,
            }
        );
    }

    #[test]
    fn test_parse_window_change() {
        let req = ChannelRequest::parse("window-change", &dims(80, 24)).unwrap();
        assert_eq!(req, ChannelRequest::WindowChange { cols: 80, rows: 24 });
    }

    #[test]
    fn test_parse_window_change_short() {
        let result = ChannelRequest::parse("window-change", &[0, 0, 0, 80]);
        assert!(matches!(result, Err(RequestError::Truncated { .. })));
    }

    #[test]
    fn test_parse_env() {
        let mut payload = string("LANG");
        payload.extend(string("pt_BR.UTF-8"));

        let req = ChannelRequest::parse("env", &payload).unwrap();
        assert_eq!(
            req,
            ChannelRequest::Env {
                key: "LANG".into(),
                value: "pt_BR.UTF-8".into(),
            }
        );
    }

    #[test]
    fn test_parse_env_length_overruns_payload() {
        let mut payload = 200u32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"KEY");

        let err = ChannelRequest::parse("env", &payload).unwrap_err();
        assert!(err.to_string().contains("env payload truncated"));
    }

    #[test]
    fn test_parse_env_invalid_utf8() {
        let mut payload = 2u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0xff, 0xfe]);
        payload.extend(string("value"));

        let err = ChannelRequest::parse("env", &payload).unwrap_err();
        assert_eq!(err, RequestError::InvalidUtf8 { kind: "env" });
    }

    #[test]
    fn test_parse_shell_requires_empty_payload() {
        assert_eq!(
            ChannelRequest::parse("shell", &[]).unwrap(),
            ChannelRequest::Shell
        );

        let err = ChannelRequest::parse("shell", b"x").unwrap_err();
        assert_eq!(
            err,
            RequestError::UnexpectedPayload {
                kind: "shell",
                len: 1
            }
        );
    }

    #[test]
    fn test_parse_subsystem() {
        let req = ChannelRequest::parse("subsystem", &string("sftp")).unwrap();
        assert_eq!(req, ChannelRequest::Subsystem { name: "sftp".into() });
    }

    #[test]
    fn test_parse_unknown_kind() {
        let req = ChannelRequest::parse("x11-req", b"anything").unwrap();
        assert_eq!(req.kind(), "x11-req");
    }
}
