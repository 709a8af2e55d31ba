//! Worker report (rapport) models and status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, TransitionError};

/// Kind of report a worker can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Free-text note for an admin
    Text,
    /// Confirmation that a supplier delivery arrived
    Delivery,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Text => "text",
            ReportType::Delivery => "delivery",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ReportType::Text),
            "delivery" => Some(ReportType::Delivery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Accepted,
    Denied,
    /// Admin answered a text report
    Responded,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Accepted => "accepted",
            ReportStatus::Denied => "denied",
            ReportStatus::Responded => "responded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReportStatus::Pending),
            "accepted" => Some(ReportStatus::Accepted),
            "denied" => Some(ReportStatus::Denied),
            "responded" => Some(ReportStatus::Responded),
            _ => None,
        }
    }

    /// Check a transition for a report of the given type.
    ///
    /// Every transition starts at `pending`. `responded` is reachable only
    /// for text reports.
    pub fn transition(
        self,
        report_type: ReportType,
        to: ReportStatus,
    ) -> Result<ReportStatus, TransitionError> {
        let rejected = || TransitionError::new(Entity::Report, self.as_str(), to.as_str());

        if self != ReportStatus::Pending {
            return Err(rejected().with_reason("report is already resolved"));
        }

        match (report_type, to) {
            (_, ReportStatus::Accepted) | (_, ReportStatus::Denied) => Ok(to),
            (ReportType::Text, ReportStatus::Responded) => Ok(to),
            (ReportType::Delivery, ReportStatus::Responded) => {
                Err(rejected().with_reason("only text reports can be responded to"))
            }
            (_, ReportStatus::Pending) => Err(rejected()),
        }
    }
}

/// Side effect a report transition triggers downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCascade {
    /// Create the unload task for this delivery and retire the delivery
    DispatchUnload { delivery_id: Uuid, worker_id: Uuid },
}

/// Worker-submitted note routed to admin review
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub worker_id: Uuid,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub content: Option<String>,
    pub delivery_id: Option<Uuid>,
    pub status: ReportStatus,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Check an admin decision and return the new status with the cascade it
    /// triggers. Nothing is changed on failure.
    pub fn review(&self, to: ReportStatus) -> Result<(ReportStatus, Option<ReportCascade>), TransitionError> {
        let status = self.status.transition(self.report_type, to)?;
        Ok((status, self.cascade_for(status)))
    }

    /// Cascade implied by moving this report to `to`
    pub fn cascade_for(&self, to: ReportStatus) -> Option<ReportCascade> {
        match (self.report_type, to, self.delivery_id) {
            (ReportType::Delivery, ReportStatus::Accepted, Some(delivery_id)) => {
                Some(ReportCascade::DispatchUnload {
                    delivery_id,
                    worker_id: self.worker_id,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(report_type: ReportType) -> Report {
        Report {
            id: Uuid::from_u128(1),
            worker_id: Uuid::from_u128(2),
            report_type,
            content: None,
            delivery_id: match report_type {
                ReportType::Delivery => Some(Uuid::from_u128(3)),
                ReportType::Text => None,
            },
            status: ReportStatus::Pending,
            response: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_delivery_report_cannot_be_responded() {
        let err = ReportStatus::Pending
            .transition(ReportType::Delivery, ReportStatus::Responded)
            .unwrap_err();
        assert!(err.to_string().contains("only text reports"));
    }

    #[test]
    fn test_responded_is_terminal() {
        assert!(ReportStatus::Responded
            .transition(ReportType::Text, ReportStatus::Accepted)
            .is_err());
    }

    #[test]
    fn test_only_accepted_delivery_cascades() {
        let delivery = report(ReportType::Delivery);
        assert_eq!(
            delivery.cascade_for(ReportStatus::Accepted),
            Some(ReportCascade::DispatchUnload {
                delivery_id: Uuid::from_u128(3),
                worker_id: Uuid::from_u128(2),
            })
        );
        assert_eq!(delivery.cascade_for(ReportStatus::Denied), None);
        assert_eq!(report(ReportType::Text).cascade_for(ReportStatus::Accepted), None);
    }

    #[test]
    fn test_review_of_resolved_report_has_no_cascade() {
        let mut delivery = report(ReportType::Delivery);
        let (status, cascade) = delivery.review(ReportStatus::Accepted).unwrap();
        assert_eq!(status, ReportStatus::Accepted);
        assert!(cascade.is_some());

        delivery.status = status;
        assert!(delivery.review(ReportStatus::Accepted).is_err());
    }
}
