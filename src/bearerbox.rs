//! The single length-framed TCP link to the bearerbox process (spec.md
//! §4.9 / C9). Reads are owned by one thread; writes are serialized
//! through an internal mutex so any worker can call `write_message`.

use serde::{Deserialize, Serialize};
use sms_proto::Message;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use tracing::{debug, warn};

/// The handful of frame kinds the bearerbox protocol carries. Anything
/// else that might arrive over the wire is logged and dropped by the
/// reader loop, matching spec.md §4.9's "other types → log+drop".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BearerboxFrame {
    Sms(Message),
    Ack(Message),
    AdminShutdown,
    AdminSuspend,
    AdminResume,
}

pub struct BearerboxLink {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
}

impl BearerboxLink {
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        let writer = stream.try_clone()?;
        Ok(BearerboxLink {
            reader: Mutex::new(stream),
            writer: Mutex::new(writer),
        })
    }

    /// Blocks for the next frame. Returns `None` on a clean EOF (the
    /// bearerbox closed the connection, e.g. during its own shutdown).
    pub fn read_message(&self) -> Option<BearerboxFrame> {
        let mut reader = self.reader.lock().unwrap();
        let mut len_buf = [0u8; 4];
        if let Err(e) = reader.read_exact(&mut len_buf) {
            if e.kind() != io::ErrorKind::UnexpectedEof {
                warn!(error = %e, "bearerbox read error");
            }
            return None;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut body) {
            warn!(error = %e, "bearerbox read error (truncated frame)");
            return None;
        }
        match serde_json::from_slice::<BearerboxFrame>(&body) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "bearerbox sent an unparseable frame; dropping");
                None
            }
        }
    }

    pub fn write_message(&self, frame: &BearerboxFrame) -> io::Result<()> {
        let body = serde_json::to_vec(frame).expect("BearerboxFrame always serializes");
        let len = (body.len() as u32).to_be_bytes();
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(&len)?;
        writer.write_all(&body)?;
        writer.flush()?;
        debug!(bytes = body.len(), "wrote frame to bearerbox");
        Ok(())
    }
}
