use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::capability::GitCapability;
use crate::error::DepGitError;
use crate::pkt_line::{SideBand, encode_flush, encode_into};
use crate::transaction::{SessionState, Transaction};

/// Outcome of one ref update command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefStatus {
    Ok(String),
    Ng(String, String),
}

/// The `report-status` block sent back at the end of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStatus {
    unpack_error: Option<String>,
    refs: Vec<RefStatus>,
}

impl ReportStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unpack_error(&mut self, msg: impl Into<String>) {
        self.unpack_error = Some(msg.into());
    }

    pub fn is_unpack_ok(&self) -> bool {
        self.unpack_error.is_none()
    }

    pub fn ok(&mut self, ref_name: impl Into<String>) {
        self.refs.push(RefStatus::Ok(ref_name.into()));
    }

    pub fn ng(&mut self, ref_name: impl Into<String>, reason: impl Into<String>) {
        self.refs.push(RefStatus::Ng(ref_name.into(), reason.into()));
    }

    pub fn refs(&self) -> &[RefStatus] {
        &self.refs
    }

    /// Unpack succeeded and no ref was rejected.
    pub fn is_success(&self) -> bool {
        self.is_unpack_ok() && self.refs.iter().all(|r| matches!(r, RefStatus::Ok(_)))
    }

    /// Status lines as pkt-lines, terminated by a flush.
    pub fn encode(&self) -> Result<Bytes, DepGitError> {
        let mut buf = BytesMut::new();
        match &self.unpack_error {
            None => encode_into(&mut buf, b"unpack ok\n")?,
            Some(msg) => encode_into(&mut buf, format!("unpack error: {}\n", msg).as_bytes())?,
        }
        for status in &self.refs {
            let line = match status {
                RefStatus::Ok(name) => format!("ok {}\n", name),
                RefStatus::Ng(name, reason) => format!("ng {} {}\n", name, reason),
            };
            encode_into(&mut buf, line.as_bytes())?;
        }
        buf.extend_from_slice(&encode_flush());
        Ok(buf.freeze())
    }
}

impl Transaction {
    /// Sends the report and closes the session. Returns the exit status.
    pub async fn report_status<W>(&mut self, writer: &mut W) -> Result<u32, DepGitError>
    where
        W: AsyncWrite + Unpin,
    {
        self.expect_state(SessionState::ReportStatus)?;
        self.write_report(writer).await?;
        self.transition(SessionState::Closed)?;
        Ok(if self.report.is_success() { 0 } else { 1 })
    }

    pub(crate) async fn write_report<W>(&self, writer: &mut W) -> Result<(), DepGitError>
    where
        W: AsyncWrite + Unpin,
    {
        let body = self.report.encode()?;
        if self.has_capability(&GitCapability::SideBand64k) {
            let mut buf = BytesMut::new();
            if !self.has_capability(&GitCapability::Quiet) && !self.objects.is_empty() {
                let progress = format!("Received {} objects, done.\n", self.objects.len());
                buf.extend_from_slice(&SideBand::Progress.wrap(progress.as_bytes())?);
            }
            buf.extend_from_slice(&SideBand::Primary.wrap(&body)?);
            buf.extend_from_slice(&encode_flush());
            writer.write_all(&buf).await?;
        } else {
            writer.write_all(&body).await?;
        }
        writer.flush().await?;
        Ok(())
    }
}
