use crate::infra::{
    seed_sample_roster, InMemoryBrokerDirectory, InMemoryInquiryRepository, TracingActivityLog,
};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use inquiry_desk::error::AppError;
use inquiry_desk::workflows::inquiries::{
    BrokerId, DeskConfig, Inquiry, InquiryDeskService, InquiryKind, InquiryServiceError,
    InquiryStatus, InquirySubmission, PropertyId,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the per-axis cost breakdown behind each assignment.
    #[arg(long)]
    pub(crate) show_costs: bool,
    /// Skip the broker deactivation portion of the demo.
    #[arg(long)]
    pub(crate) skip_reassignment: bool,
}

type DemoDesk =
    InquiryDeskService<InMemoryInquiryRepository, InMemoryBrokerDirectory, TracingActivityLog>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        show_costs,
        skip_reassignment,
    } = args;

    let now = Utc::now();
    let repository = InMemoryInquiryRepository::default();
    let directory = InMemoryBrokerDirectory::new(repository.clone());
    seed_sample_roster(&directory, now);
    let log = TracingActivityLog::default();
    let desk: DemoDesk = InquiryDeskService::new(
        Arc::new(repository),
        Arc::new(directory),
        Arc::new(log.clone()),
        DeskConfig::default(),
    );

    println!("Inquiry desk demo");
    println!("\nIntake and assignment");
    let mut accepted = Vec::new();
    for (offset, submission) in demo_submissions().into_iter().enumerate() {
        let at = now + Duration::minutes(offset as i64);
        match desk.submit_at(submission, at) {
            Ok(receipt) => {
                let view = receipt.inquiry.status_view();
                println!(
                    "- {} for {} -> {} ({})",
                    view.inquiry_id.0,
                    receipt.inquiry.property_id.0,
                    view.assigned_broker_id
                        .as_ref()
                        .map(|broker| broker.0.as_str())
                        .unwrap_or("unassigned"),
                    receipt.check.summary()
                );
                if let Some(reason) = &receipt.dispatch_error {
                    println!("  routing pending: {reason}");
                }
                if show_costs {
                    print_costs(&desk, &receipt.inquiry, at)?;
                }
                accepted.push(receipt.inquiry.id);
            }
            Err(InquiryServiceError::DuplicateRejected(check)) => {
                println!("- rejected: {}", check.summary());
            }
            Err(err) => return Err(err.into()),
        }
    }

    println!("\nLifecycle");
    if let Some(first) = accepted.first() {
        for (step, status) in [InquiryStatus::Contacted, InquiryStatus::Scheduled]
            .into_iter()
            .enumerate()
        {
            let at = now + Duration::hours(step as i64 + 1);
            let inquiry = desk.transition_at(first, status, at)?;
            println!("- {} -> {}", inquiry.id.0, inquiry.status.label());
        }
        let rewind = desk.transition_at(first, InquiryStatus::New, now + Duration::hours(3));
        if let Err(err) = rewind {
            println!("- refused: {err}");
        }
    }

    let flagged = log.duplicates();
    if flagged.is_empty() {
        println!("\nDuplicate log: empty");
    } else {
        println!("\nDuplicate log");
        for entry in flagged {
            println!(
                "- {} on {}: {} / {}",
                entry.email,
                entry.property_id.0,
                entry.duplicate_type.label(),
                entry.action.label()
            );
        }
    }

    if skip_reassignment {
        return Ok(());
    }

    println!("\nBroker deactivation");
    let departing = BrokerId("broker-anna".to_string());
    let at = now + Duration::hours(4);
    let report = desk.deactivate_broker_at(&departing, at)?;
    println!(
        "- {}: {} moved, {} retained",
        report.broker_id.0,
        report.moved_count(),
        report.retained.len()
    );
    for moved in &report.moved {
        println!("  - {} -> {}", moved.inquiry_id.0, moved.to.0);
    }

    Ok(())
}

fn print_costs(
    desk: &DemoDesk,
    inquiry: &Inquiry,
    at: DateTime<Utc>,
) -> Result<(), AppError> {
    let ranked = desk
        .dispatcher()
        .rank_candidates(inquiry, None, at)
        .map_err(InquiryServiceError::from)?;
    for candidate in ranked {
        println!(
            "    {} total {:.2}",
            candidate.broker_id.0, candidate.cost.total
        );
        for component in &candidate.cost.components {
            println!(
                "      {:?}: {:.2} ({})",
                component.factor, component.weighted, component.notes
            );
        }
    }
    Ok(())
}

fn demo_submissions() -> Vec<InquirySubmission> {
    let base = InquirySubmission {
        property_id: PropertyId("prop-sodermalm-7".to_string()),
        name: "Alex Nyström".to_string(),
        email: Some("alex@example.com".to_string()),
        phone: None,
        message: Some(
            "Hello, is the two-room apartment still available for a viewing?".to_string(),
        ),
        kind: InquiryKind::Viewing,
        client_id: None,
        ip_address: None,
    };

    vec![
        base.clone(),
        InquirySubmission {
            property_id: PropertyId("prop-fyris-2".to_string()),
            name: "Maja Ek".to_string(),
            email: Some("maja@example.com".to_string()),
            message: Some("What is the monthly fee for the association?".to_string()),
            kind: InquiryKind::Information,
            ..base.clone()
        },
        base.clone(),
        InquirySubmission {
            message: Some(
                "Hello, is the two-room apartment still available for a showing?".to_string(),
            ),
            ..base
        },
    ]
}
