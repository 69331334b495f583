use super::Budget;
use crate::{conf::HttpDeadlines, GspErr};
use serde::de::DeserializeOwned;
use std::{io::ErrorKind, net::SocketAddr};
use tracing::trace;

/// Plain HTTP client bound to one server and one global deadline.
pub struct HttpTransport {
    protocol: &'static str,
    addr: SocketAddr,
    base_url: String,
    global: Budget,
}

impl HttpTransport {
    pub fn create(protocol: &'static str, addr: &SocketAddr, deadlines: &HttpDeadlines) -> Self {
        Self {
            protocol,
            addr: *addr,
            base_url: format!("http://{}", addr),
            global: Budget::create("http request", deadlines.global),
        }
    }

    fn map_ureq_err(&self, err: ureq::Error) -> GspErr {
        match err {
            ureq::Error::Timeout(_) => self.global.timeout(),
            ureq::Error::StatusCode(status) => GspErr::IoErr {
                phase: "http request",
                source: std::io::Error::other(format!("unexpected HTTP status {}", status)),
            },
            ureq::Error::HostNotFound => GspErr::address(&self.base_url, "host not found"),
            ureq::Error::ConnectionFailed => GspErr::ConnectErr {
                phase: "http connect",
                addr: self.addr,
                source: ErrorKind::ConnectionRefused.into(),
            },
            ureq::Error::Io(err) if err.kind() == ErrorKind::ConnectionRefused => {
                GspErr::ConnectErr {
                    phase: "http connect",
                    addr: self.addr,
                    source: err,
                }
            }
            ureq::Error::Io(err) => self.global.map_io_err(err),
            err => GspErr::IoErr {
                phase: "http request",
                source: std::io::Error::other(err.to_string()),
            },
        }
    }

    /// GET `path` and decode the body as JSON.
    ///
    /// Each call is bounded by what is left of the global budget.
    pub fn get_json<T: DeserializeOwned>(&mut self, path: &str) -> Result<T, GspErr> {
        let slice = self.global.slice()?;
        let url = format!("{}{}", self.base_url, path);
        let started = std::time::Instant::now();

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(slice))
            .http_status_as_error(true)
            .build()
            .into();

        let result = agent
            .get(&url)
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string());
        self.global.charge(started.elapsed());
        let body = result.map_err(|err| self.map_ureq_err(err))?;

        trace!(%url, len = body.len(), "http response");

        serde_json::from_str::<T>(&body)
            .map_err(|err| GspErr::parse(self.protocol, format!("{}: {}", path, err)))
    }
}
