//! Seed a demo workspace into the configured store: one admin with a session token,
//! a three-stage pipeline, a custom field, a required field and two campaigns.
//! Run with the gateway stopped (sled holds an exclusive lock): cargo run --bin seed

use chrono::Utc;
use minicrm_core::{
    Campaign, CrmConfig, FieldType, Lead, LeadCustomField, LeadCustomValue, MemberRole,
    PipelineStage, Session, SledStore, StageRequiredField, StoreResult, Workspace,
    WorkspaceMember,
};
use uuid::Uuid;

const DEMO_USER: &str = "demo-user";

fn seed(store: &SledStore) -> StoreResult<(Workspace, String)> {
    let workspace = Workspace::new("Demo SDR Team", DEMO_USER);
    store.put_workspace(&workspace)?;
    store.add_member(&WorkspaceMember {
        workspace_id: workspace.id.clone(),
        user_id: DEMO_USER.into(),
        role: MemberRole::Admin,
        created_at: Utc::now(),
    })?;

    let token = Uuid::new_v4().simple().to_string();
    store.put_session(&Session {
        token: token.clone(),
        user_id: DEMO_USER.into(),
        created_at: Utc::now(),
    })?;

    let new = PipelineStage::new(&workspace.id, "New", 0);
    let contacted = PipelineStage::new(&workspace.id, "Contacted", 1);
    let qualified = PipelineStage::new(&workspace.id, "Qualified", 2);
    for stage in [&new, &contacted, &qualified] {
        store.put_stage(stage)?;
    }
    store.put_required_field(&StageRequiredField::new(&workspace.id, &qualified.id, "email"))?;

    let segment = LeadCustomField::new(&workspace.id, "Segment", FieldType::Select);
    store.put_custom_field(&segment)?;

    let mut intro = Campaign::new(&workspace.id, "Intro");
    intro.context = Some("B2B SaaS that automates sales outreach for small teams".into());
    intro.trigger_stage_id = Some(contacted.id.clone());
    store.put_campaign(&intro)?;

    let mut follow_up = Campaign::new(&workspace.id, "Follow-up");
    follow_up.context = Some("Second touch after a first conversation".into());
    follow_up.prompt = Some("Propose a short call next week".into());
    follow_up.trigger_stage_id = Some(qualified.id.clone());
    store.put_campaign(&follow_up)?;

    let mut lead = Lead::new(&workspace.id, &new.id, "Ana");
    lead.company = Some("Acme".into());
    lead.job_title = Some("Head of Sales".into());
    lead.source = Some("LinkedIn".into());
    store.put_lead_with_values(
        &lead,
        &[LeadCustomValue::new(&lead.id, &segment.id, Some("Retail"))],
    )?;

    println!("[SEED] stages: new={} contacted={} qualified={}", new.id, contacted.id, qualified.id);
    println!("[SEED] campaigns: intro={} follow_up={}", intro.id, follow_up.id);
    println!("[SEED] lead: {}", lead.id);
    Ok((workspace, token))
}

fn main() {
    let _ = dotenvy::dotenv();
    let config = match CrmConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[SEED] invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = SledStore::open_path(&config.storage_path).and_then(|store| {
        let seeded = seed(&store)?;
        store.flush()?;
        Ok(seeded)
    });

    match result {
        Ok((workspace, token)) => {
            println!("[SEED] workspace: {} ({})", workspace.name, workspace.id);
            println!("[SEED] bearer token: {}", token);
            println!("[SEED] store: {}", config.storage_path);
        }
        Err(e) => {
            eprintln!("[SEED] failed: {}", e);
            std::process::exit(1);
        }
    }
}
