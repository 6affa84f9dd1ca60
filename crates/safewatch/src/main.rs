//! `safewatch` - CLI for personal-safety incident tracking
//!
//! This binary drives the incident service from the command line: consent
//! registration, incident lifecycle, contacts and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde_json::json;
use tracing::debug;

use safewatch::api::ApiResponse;
use safewatch::cli::{
    Cli, Command, ConfigCommand, ConsentCommand, ContactsCommand, IncidentCommand,
};
use safewatch::consent::DEFAULT_CONSENT_TEXT;
use safewatch::{init_logging, App, Config, Contact};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    let command = match cli.command {
        Command::Config(config_cmd) => return handle_config(&config, config_cmd),
        other => other,
    };

    let app = App::from_config(config)?;
    let result = match command {
        Command::Consent(cmd) => handle_consent(&app, cmd),
        Command::Incident(cmd) => handle_incident(&app, cmd).await,
        Command::Contacts(cmd) => handle_contacts(&app, cmd),
        Command::Status(status_cmd) => handle_status(&app, status_cmd.json),
        Command::Config(_) => Ok(()),
    };

    // Flush any alerts queued by this command before exiting
    let stats = app.shutdown().await;
    debug!(
        "notifications: {} attempted, {} delivered, {} failed",
        stats.attempted, stats.delivered, stats.failed
    );
    result
}

fn handle_consent(app: &App, cmd: ConsentCommand) -> anyhow::Result<()> {
    match cmd {
        ConsentCommand::Register { user_id, text } => {
            let body = json!({
                "user_id": user_id,
                "consent_text": text.as_deref().unwrap_or(DEFAULT_CONSENT_TEXT),
            });
            let resp = app.service().register_consent(body.to_string().as_bytes());
            let resp = check(resp)?;
            println!("{}", resp.body["token"].as_str().unwrap_or_default());
        }
        ConsentCommand::List { user_id, json } => {
            let records = app.store().list_consents(&user_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No consent recorded for {user_id}");
            } else {
                for record in records {
                    println!("{}  {}", record.ts.to_rfc3339(), record.consent_text);
                }
            }
        }
    }
    Ok(())
}

async fn handle_incident(app: &App, cmd: IncidentCommand) -> anyhow::Result<()> {
    let service = app.service();
    match cmd {
        IncidentCommand::Start {
            incident_id,
            user,
            auth,
        } => {
            let body = json!({"incident_id": incident_id, "user_id": user});
            let auth = auth.authorization();
            check(service.start_incident(auth.as_deref(), body.to_string().as_bytes()))?;
            println!("Incident {incident_id} started");
        }
        IncidentCommand::Update {
            incident_id,
            user,
            lat,
            lon,
            accuracy,
            timestamp,
            auth,
        } => {
            let timestamp = timestamp
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
            let body = json!({
                "incident_id": incident_id,
                "user_id": user,
                "lat": lat,
                "lon": lon,
                "accuracy": accuracy,
                "timestamp": timestamp,
            });
            let auth = auth.authorization();
            check(
                service
                    .update_location(auth.as_deref(), body.to_string().as_bytes())
                    .await,
            )?;
            println!("Location saved for {incident_id}");
        }
        IncidentCommand::Stop {
            incident_id,
            json,
            auth,
        } => {
            let body = json!({"incident_id": incident_id});
            let auth = auth.authorization();
            let resp = check(service.stop_incident(auth.as_deref(), body.to_string().as_bytes()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp.body)?);
            } else {
                println!("Incident {incident_id} stopped");
                print_entries(&resp.body["report"]);
            }
        }
        IncidentCommand::Report {
            incident_id,
            json,
            auth,
        } => {
            let auth = auth.authorization();
            let resp = check(service.get_report(auth.as_deref(), &incident_id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp.body)?);
            } else {
                println!("Report for {incident_id}");
                print_entries(&resp.body["report"]);
            }
        }
        IncidentCommand::Show { incident_id, json } => {
            let Some(incident) = app.engine().incident(&incident_id)? else {
                bail!("no incident with id {incident_id}");
            };
            if json {
                let mut value = serde_json::to_value(&incident)?;
                value["state"] = json!(incident.state().to_string());
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Incident:  {}", incident.incident_id);
                println!("Owner:     {}", incident.owner_id);
                println!("State:     {}", incident.state());
                println!("Started:   {}", incident.started_at.to_rfc3339());
                if let Some(stopped_at) = incident.stopped_at {
                    println!("Stopped:   {}", stopped_at.to_rfc3339());
                }
            }
        }
    }
    Ok(())
}

fn handle_contacts(app: &App, cmd: ContactsCommand) -> anyhow::Result<()> {
    match cmd {
        ContactsCommand::Add {
            owner_id,
            name,
            phone,
            email,
        } => {
            let mut contact = Contact::new(owner_id, name);
            contact.phone = phone;
            contact.email = email;
            app.store().add_contact(&contact)?;
            println!("Added contact {} for {}", contact.name, contact.owner_id);
        }
        ContactsCommand::List { owner_id, json } => {
            let contacts = app.store().list_contacts(&owner_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&contacts)?);
            } else if contacts.is_empty() {
                println!("No contacts for {owner_id}");
            } else {
                for contact in contacts {
                    println!(
                        "{:<20} {:<16} {}",
                        contact.name,
                        contact.phone.as_deref().unwrap_or("-"),
                        contact.email.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
    Ok(())
}

fn handle_status(app: &App, json: bool) -> anyhow::Result<()> {
    let stats = app.store().stats()?;
    let config = app.config();
    if json {
        let status = json!({
            "database_path": config.database_path(),
            "notifier": config.notifier.kind,
            "total_incidents": stats.total_incidents,
            "active_incidents": stats.active_incidents,
            "total_locations": stats.total_locations,
            "total_contacts": stats.total_contacts,
            "total_consents": stats.total_consents,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("safewatch status");
        println!("----------------");
        println!("Database:      {}", config.database_path().display());
        println!("Notifier:      {:?}", config.notifier.kind);
        println!(
            "Incidents:     {} ({} active)",
            stats.total_incidents, stats.active_incidents
        );
        println!("Locations:     {}", stats.total_locations);
        println!("Contacts:      {}", stats.total_contacts);
        println!("Consents:      {}", stats.total_consents);
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = config.redacted();
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Auth]");
                println!("  JWT secret:         {}", config.auth.jwt_secret);
                println!("  Token TTL (hours):  {}", config.auth.token_ttl_hours);
                println!();
                println!("[Notifier]");
                println!("  Kind:               {:?}", config.notifier.kind);
                println!("  Map link base:      {}", config.notifier.map_link_base);
                println!("  Queue capacity:     {}", config.notifier.queue_capacity);
                println!("  Timeout (secs):     {}", config.notifier.timeout_secs);
                println!(
                    "  Twilio account:     {}",
                    config.notifier.twilio.account_sid.as_deref().unwrap_or("-")
                );
                println!(
                    "  Twilio from:        {}",
                    config.notifier.twilio.from_number.as_deref().unwrap_or("-")
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}

/// Turn a non-2xx response into an error carrying its body.
fn check(resp: ApiResponse) -> anyhow::Result<ApiResponse> {
    if resp.is_success() {
        Ok(resp)
    } else {
        bail!("request failed ({}): {}", resp.status, resp.body)
    }
}

fn print_entries(entries: &serde_json::Value) {
    let entries = entries.as_array().map(Vec::as_slice).unwrap_or_default();
    if entries.is_empty() {
        println!("  (no locations)");
        return;
    }
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "  {:>3}. {}, {} (±{} m) at {}",
            i + 1,
            entry["lat"],
            entry["lon"],
            entry["accuracy"],
            entry["ts"].as_str().unwrap_or("-")
        );
    }
}
