use crate::infra::{Registry, Wiring};
use clap::Args;
use lifeline::error::AppError;
use lifeline::payments::{PaymentMethod, PaymentRequest, PaymentState};
use lifeline::registry::{
    ApprovalStatus, BloodMatchMode, BloodType, DonorProfile, DonorSubmission, MatchingConfig,
    RecipientRequest, RecipientSubmission, RegistryError, RequestStatus, Role, TransitionCommand,
    TransitionOutcome, UrgencyLevel, UserId,
};

const COORDINATOR: &str = "coordinator";
const DONOR: &str = "demo-donor";
const HOSPITAL: &str = "demo-hospital";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Blood comparison used by matching: `compatible` (ABO/Rh) or `exact`.
    #[arg(long, value_parser = parse_match_mode)]
    pub(crate) blood_match_mode: Option<BloodMatchMode>,
    /// Amount of the demo donation payment, in cents.
    #[arg(long, default_value_t = 2_500)]
    pub(crate) donation_cents: u64,
    /// Skip the donation payment portion of the demo.
    #[arg(long)]
    pub(crate) skip_payment: bool,
}

fn parse_match_mode(raw: &str) -> Result<BloodMatchMode, String> {
    BloodMatchMode::parse(raw).ok_or_else(|| format!("unknown blood match mode '{raw}'"))
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        blood_match_mode,
        donation_cents,
        skip_payment,
    } = args;

    let matching = MatchingConfig {
        blood_match_mode: blood_match_mode.unwrap_or_default(),
        ..MatchingConfig::default()
    };
    println!(
        "Lifeline registry demo (blood match mode: {:?})",
        matching.blood_match_mode
    );

    println!("\nScenario A: universal donor");
    run_match_scenario(matching, BloodType::ONegative, true, BloodType::AbPositive)?;

    println!("\nScenario B: incompatible blood types");
    run_match_scenario(matching, BloodType::APositive, true, BloodType::BPositive)?;

    println!("\nScenario C: donor awaiting review");
    run_match_scenario(matching, BloodType::ONegative, false, BloodType::ONegative)?;

    println!("\nScenario D: request approved then fulfilled");
    let wiring = demo_wiring(matching);
    let request = submit_request(&wiring.registry, BloodType::OPositive)?;
    for target in [RequestStatus::Approved, RequestStatus::Fulfilled] {
        let updated = move_request(&wiring.registry, &request, target)?;
        println!("- {} -> {}", updated.id, updated.status.label());
    }

    println!("\nScenario E: fulfillment without approval");
    let wiring = demo_wiring(matching);
    let request = submit_request(&wiring.registry, BloodType::OPositive)?;
    match move_request(&wiring.registry, &request, RequestStatus::Fulfilled) {
        Err(err @ RegistryError::IllegalTransition { .. }) => println!("- refused: {err}"),
        Ok(updated) => println!("- unexpectedly moved to {}", updated.status.label()),
        Err(err) => return Err(err.into()),
    }
    let stored = wiring
        .registry
        .recipient_request(&UserId::new(COORDINATOR), request.id)?;
    println!("- {} remains {}", stored.id, stored.status.label());

    if skip_payment {
        return Ok(());
    }

    println!("\nDonation payment");
    let ticket = wiring.payments.submit(PaymentRequest {
        payer: UserId::new(DONOR),
        amount_cents: donation_cents,
        currency: "USD".to_string(),
        method: PaymentMethod::Card,
        request_id: Some(request.id),
    })?;
    println!("- {} accepted, state {:?}", ticket.id(), ticket.current());
    match ticket.wait().await {
        PaymentState::Succeeded { receipt } => println!(
            "- settled {} {:.2} (reference {})",
            receipt.currency,
            receipt.amount_cents as f64 / 100.0,
            receipt.reference
        ),
        PaymentState::Failed { reason } => println!("- failed: {reason}"),
        PaymentState::Processing => println!("- still processing"),
    }

    Ok(())
}

fn demo_wiring(matching: MatchingConfig) -> Wiring {
    let wiring = Wiring::build(&[COORDINATOR.to_string()], matching);
    wiring.directory.register(UserId::new(DONOR), Role::Donor);
    wiring.directory.register(UserId::new(HOSPITAL), Role::Hospital);
    wiring
}

fn run_match_scenario(
    matching: MatchingConfig,
    donor_blood: BloodType,
    approve: bool,
    needed: BloodType,
) -> Result<(), AppError> {
    let wiring = demo_wiring(matching);
    let donor = submit_donor(&wiring.registry, donor_blood)?;
    if approve {
        let command = TransitionCommand::DonorProfile {
            id: donor.id,
            target: ApprovalStatus::Approved,
            expected: Some(ApprovalStatus::Pending),
        };
        wiring.registry.transition(command, &UserId::new(COORDINATOR))?;
    }
    let request = submit_request(&wiring.registry, needed)?;
    let matches = wiring.registry.find_matches(request.id)?;

    println!(
        "- {} ({}, {}) for {} needing {}: {}",
        donor.id,
        donor_blood.label(),
        if approve { "APPROVED" } else { "PENDING" },
        request.id,
        needed.label(),
        if matches.contains(donor.id) {
            "match"
        } else {
            "no match"
        }
    );
    Ok(())
}

fn submit_donor(registry: &Registry, blood_type: BloodType) -> Result<DonorProfile, AppError> {
    let submission = DonorSubmission {
        blood_type: Some(blood_type),
        organ: None,
        location: "Iowa City".to_string(),
        contact_info: "555-0110".to_string(),
        availability: true,
        last_donation_date: None,
    };
    Ok(registry.create_donor_profile(&UserId::new(DONOR), submission)?)
}

fn submit_request(registry: &Registry, needed: BloodType) -> Result<RecipientRequest, AppError> {
    let submission = RecipientSubmission {
        blood_type_needed: Some(needed),
        organ_needed: None,
        location: "Iowa City".to_string(),
        contact_info: "555-0120".to_string(),
        urgency_level: UrgencyLevel::High,
        medical_condition: "scheduled surgery".to_string(),
        hospital_id: Some(HOSPITAL.to_string()),
        request_date: None,
    };
    Ok(registry.create_recipient_request(&UserId::new(HOSPITAL), submission)?)
}

fn move_request(
    registry: &Registry,
    request: &RecipientRequest,
    target: RequestStatus,
) -> Result<RecipientRequest, RegistryError> {
    let command = TransitionCommand::RecipientRequest {
        id: request.id,
        target,
        expected: None,
    };
    match registry.transition(command, &UserId::new(COORDINATOR))? {
        TransitionOutcome::RecipientRequest(updated) => Ok(updated),
        TransitionOutcome::DonorProfile(_) => Ok(request.clone()),
    }
}
