//! Seed the database with sample complaints.

use chrono::Utc;

use compass_core::{Category, ComplaintStatus, Priority};
use compass_server::db::{ComplaintRepository, PgComplaintRepository};
use compass_server::models::{NewComplaint, Submitter};

use super::{CliError, connect};

struct Sample {
    title: &'static str,
    description: &'static str,
    category: Category,
    priority: Priority,
    status: ComplaintStatus,
}

const SAMPLES: [Sample; 4] = [
    Sample {
        title: "Room service was extremely slow",
        description: "I ordered room service at 7 PM and it arrived at 10 PM. The food was cold \
                      and the service was unprofessional.",
        category: Category::Service,
        priority: Priority::High,
        status: ComplaintStatus::Pending,
    },
    Sample {
        title: "Defective room key card",
        description: "The key card for room 205 stopped working multiple times during my stay. \
                      Had to go to reception 4 times.",
        category: Category::Product,
        priority: Priority::Medium,
        status: ComplaintStatus::InProgress,
    },
    Sample {
        title: "Unhelpful customer support",
        description: "Called customer support regarding billing issues and the representative \
                      was rude and unhelpful.",
        category: Category::Support,
        priority: Priority::High,
        status: ComplaintStatus::Resolved,
    },
    Sample {
        title: "Broken air conditioning",
        description: "The AC in room 312 was not working properly. Room was too hot for \
                      comfortable sleep.",
        category: Category::Product,
        priority: Priority::Medium,
        status: ComplaintStatus::Pending,
    },
];

/// Insert the sample complaints.
///
/// # Arguments
///
/// * `clear_existing` - If true, delete every existing complaint first
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn complaints(clear_existing: bool) -> Result<(), CliError> {
    let repo = PgComplaintRepository::new(connect().await?);

    if clear_existing {
        let removed = repo.clear().await?;
        tracing::info!(removed, "Cleared existing complaints");
    }

    let now = Utc::now();
    for sample in SAMPLES {
        let complaint = repo
            .insert(NewComplaint {
                title: sample.title.to_owned(),
                description: sample.description.to_owned(),
                category: sample.category,
                priority: sample.priority,
                status: sample.status,
                submitted_by: Submitter::Anonymous,
                submitted_at: now,
            })
            .await?;
        tracing::info!(id = %complaint.id, title = %complaint.title, "Inserted complaint");
    }

    tracing::info!("Database seeded with {} complaints", SAMPLES.len());
    Ok(())
}
