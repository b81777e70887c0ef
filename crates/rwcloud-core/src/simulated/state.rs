//! Per-region entity storage for the simulated backend
//!
//! Records store the target state of each entity plus the instants at which
//! its transient status resolves. Reads project the record at the current
//! time without writing; writes call [`RegionState::settle`] first so resolved
//! transitions are materialized and deleted entities are dropped.

use tokio::time::Instant;
use uuid::Uuid;

use crate::model::{
    Cluster, ClusterStatus, ClusterUser, HealthStatus, PrivateLink, PrivateLinkStatus,
};

/// Pending transition of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    /// Becomes Running at `running_at`, then Healthy at `healthy_at`
    Converge {
        running_at: Instant,
        healthy_at: Instant,
    },
    /// Disappears at `gone_at`
    Delete { gone_at: Instant },
}

#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub user: ClusterUser,
    pub password: String,
}

#[derive(Debug, Clone)]
pub(crate) struct LinkRecord {
    pub link: PrivateLink,
    /// Before this instant the link is not returned by reads
    pub visible_at: Instant,
    pub created_at: Instant,
    pub gone_at: Option<Instant>,
    /// Endpoint the link resolves to once Created
    pub resolved_endpoint: String,
}

impl LinkRecord {
    pub fn view(&self, now: Instant) -> Option<PrivateLink> {
        if now < self.visible_at {
            return None;
        }
        let mut link = self.link.clone();
        match self.gone_at {
            Some(gone_at) if now >= gone_at => return None,
            Some(_) => link.status = PrivateLinkStatus::Deleting,
            None if link.status == PrivateLinkStatus::Creating && now >= self.created_at => {
                link.status = PrivateLinkStatus::Created;
            }
            None => {}
        }
        if link.status == PrivateLinkStatus::Created && link.endpoint.is_none() {
            link.endpoint = Some(self.resolved_endpoint.clone());
        }
        Some(link)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ClusterRecord {
    pub cluster: Cluster,
    pub pending: Option<Pending>,
    pub users: Vec<UserRecord>,
    pub private_links: Vec<LinkRecord>,
}

impl ClusterRecord {
    pub fn new(cluster: Cluster, pending: Option<Pending>) -> Self {
        Self {
            cluster,
            pending,
            users: Vec::new(),
            private_links: Vec::new(),
        }
    }

    /// The cluster as observed at `now`, or `None` once it is gone
    pub fn view(&self, now: Instant) -> Option<Cluster> {
        let mut cluster = self.cluster.clone();
        match self.pending {
            None => {}
            Some(Pending::Converge {
                running_at,
                healthy_at,
            }) => {
                if now >= running_at {
                    cluster.status = ClusterStatus::Running;
                }
                if now >= healthy_at {
                    cluster.health = HealthStatus::Healthy;
                }
            }
            Some(Pending::Delete { gone_at }) => {
                if now >= gone_at {
                    return None;
                }
            }
        }
        Some(cluster)
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        !matches!(self.pending, Some(Pending::Delete { gone_at }) if now >= gone_at)
    }

    pub fn is_deleting(&self) -> bool {
        matches!(self.pending, Some(Pending::Delete { .. }))
    }

    pub fn link(&self, id: Uuid, now: Instant) -> Option<PrivateLink> {
        self.private_links
            .iter()
            .find(|l| l.link.id == id)
            .and_then(|l| l.view(now))
    }

    pub fn link_mut(&mut self, id: Uuid, now: Instant) -> Option<&mut LinkRecord> {
        self.private_links
            .iter_mut()
            .find(|l| l.link.id == id && l.view(now).is_some())
    }

    pub fn user(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.user.username == username)
    }

    pub fn user_mut(&mut self, username: &str) -> Option<&mut UserRecord> {
        self.users.iter_mut().find(|u| u.user.username == username)
    }

    fn settle(&mut self, now: Instant) {
        if let Some(Pending::Converge { healthy_at, .. }) = self.pending
            && let Some(view) = self.view(now)
        {
            self.cluster.status = view.status;
            self.cluster.health = view.health;
            if now >= healthy_at {
                self.pending = None;
            }
        }

        self.private_links.retain_mut(|record| {
            if now < record.visible_at {
                return true;
            }
            match record.view(now) {
                Some(view) => {
                    if record.gone_at.is_none() {
                        record.link.status = view.status;
                        record.link.endpoint = view.endpoint;
                    }
                    true
                }
                None => false,
            }
        });
    }
}

/// All clusters of one region, in insertion order
#[derive(Debug, Default)]
pub(crate) struct RegionState {
    pub clusters: Vec<ClusterRecord>,
}

impl RegionState {
    /// Materialize resolved transitions and drop deleted entities
    pub fn settle(&mut self, now: Instant) {
        self.clusters.retain_mut(|record| {
            if !record.is_visible(now) {
                return false;
            }
            record.settle(now);
            true
        });
    }

    pub fn by_id(&self, id: u64, now: Instant) -> Option<&ClusterRecord> {
        self.clusters
            .iter()
            .find(|r| r.cluster.id == id && r.is_visible(now))
    }

    pub fn by_id_mut(&mut self, id: u64, now: Instant) -> Option<&mut ClusterRecord> {
        self.clusters
            .iter_mut()
            .find(|r| r.cluster.id == id && r.is_visible(now))
    }

    pub fn by_name(&self, name: &str, now: Instant) -> Option<&ClusterRecord> {
        self.clusters
            .iter()
            .find(|r| r.cluster.name == name && r.is_visible(now))
    }

    pub fn by_ns_id(&self, ns_id: Uuid, now: Instant) -> Option<&ClusterRecord> {
        self.clusters
            .iter()
            .find(|r| r.cluster.ns_id == ns_id && r.is_visible(now))
    }

    pub fn by_ns_id_mut(&mut self, ns_id: Uuid, now: Instant) -> Option<&mut ClusterRecord> {
        self.clusters
            .iter_mut()
            .find(|r| r.cluster.ns_id == ns_id && r.is_visible(now))
    }
}
