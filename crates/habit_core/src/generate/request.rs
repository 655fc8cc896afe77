use crate::error::AppError;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Call site of a generator request. At most one request per site is in
/// flight at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestSite {
    Goal,
    Subtasks(String),
    Reassess(String),
}

impl fmt::Display for RequestSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goal => write!(f, "goal"),
            Self::Subtasks(id) => write!(f, "subtasks:{id}"),
            Self::Reassess(id) => write!(f, "reassess:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    site: RequestSite,
    serial: u64,
}

impl RequestTicket {
    pub fn site(&self) -> &RequestSite {
        &self.site
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    serial: u64,
    abandoned: bool,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    in_flight: HashMap<RequestSite, InFlight>,
    next_serial: u64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request for `site`. Fails while another live request for
    /// the same site has not finished. An abandoned one is superseded.
    pub fn begin(&mut self, site: RequestSite) -> Result<RequestTicket, AppError> {
        if self.is_in_flight(&site) {
            warn!(site = %site, "duplicate generator request rejected");
            return Err(AppError::invalid_input(format!(
                "a {site} request is already in flight"
            )));
        }

        self.next_serial += 1;
        let serial = self.next_serial;
        self.in_flight.insert(
            site.clone(),
            InFlight {
                serial,
                abandoned: false,
            },
        );
        Ok(RequestTicket { site, serial })
    }

    /// Marks the live request for `site` as stale. Its result is discarded
    /// when it resolves.
    pub fn abandon(&mut self, site: &RequestSite) {
        if let Some(entry) = self.in_flight.get_mut(site) {
            entry.abandoned = true;
        }
    }

    pub fn is_in_flight(&self, site: &RequestSite) -> bool {
        self.in_flight
            .get(site)
            .is_some_and(|entry| !entry.abandoned)
    }

    /// Closes `ticket`. Returns whether its result may be applied.
    pub fn finish(&mut self, ticket: RequestTicket) -> bool {
        match self.in_flight.get(&ticket.site) {
            Some(entry) if entry.serial == ticket.serial => {
                let applicable = !entry.abandoned;
                self.in_flight.remove(&ticket.site);
                applicable
            }
            _ => false,
        }
    }
}
