use super::*;
use signalhub_core::{ConflictStrategy, PartnerKind};

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["signalhub-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["signalhub-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn ingest_jobs_collects_repeated_keywords() {
    let cli = Cli::try_parse_from([
        "signalhub-cli",
        "ingest",
        "jobs",
        "--keyword",
        "CTO",
        "--keyword",
        "VP of Sales",
        "--source",
        "rss",
        "--queue",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Ingest {
            command:
                IngestCommands::Jobs {
                    keywords,
                    sources,
                    queue,
                    days_back,
                    location,
                },
        }) => {
            assert_eq!(keywords, ["CTO", "VP of Sales"]);
            assert_eq!(sources, ["rss"]);
            assert!(queue);
            assert_eq!(days_back, 7);
            assert!(location.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn sync_bidirectional_defaults_to_newest() {
    let cli = Cli::try_parse_from(["signalhub-cli", "sync", "bidirectional"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Bidirectional {
                partner: None,
                strategy: ConflictStrategy::Newest
            }
        })
    ));
}

#[test]
fn sync_partner_is_case_insensitive() {
    let cli = Cli::try_parse_from(["signalhub-cli", "sync", "pull", "--partner", "linkedin"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Pull {
                partner: Some(PartnerKind::LinkedIn),
                limit: None
            }
        })
    ));
}

#[test]
fn unknown_strategy_is_rejected() {
    assert!(Cli::try_parse_from([
        "signalhub-cli",
        "sync",
        "bidirectional",
        "--strategy",
        "loudest"
    ])
    .is_err());
}

#[test]
fn queue_work_drain_flag() {
    let cli = Cli::try_parse_from(["signalhub-cli", "queue", "work", "--drain"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Queue {
            command: QueueCommands::Work { drain: true }
        })
    ));
}

#[test]
fn bucket_trigger_requires_bucket_id() {
    assert!(Cli::try_parse_from(["signalhub-cli", "buckets", "trigger"]).is_err());
    let cli = Cli::try_parse_from(["signalhub-cli", "buckets", "trigger", "--bucket", "3"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Buckets {
            command: BucketCommands::Trigger { bucket: 3 }
        })
    ));
}

#[test]
fn integrations_add_builds_a_new_integration() {
    use signalhub_core::IntegrationStatus;
    use signalhub_pipeline::NewIntegration;

    let cli = Cli::try_parse_from([
        "signalhub-cli",
        "integrations",
        "add",
        "--partner",
        "indeed",
        "--status",
        "active",
        "--api-key",
        "indeed-key",
        "--partner-id",
        "p-9",
    ])
    .expect("expected valid cli args");

    let Some(Commands::Integrations {
        command: crate::integrations::IntegrationCommands::Add(args),
    }) = cli.command
    else {
        panic!("expected integrations add");
    };
    let request = NewIntegration::from(args);
    assert_eq!(request.partner, PartnerKind::Indeed);
    assert_eq!(request.status, IntegrationStatus::Active);
    assert_eq!(request.credentials.api_key.as_deref(), Some("indeed-key"));
    assert_eq!(request.credentials.partner_id.as_deref(), Some("p-9"));
    assert!(request.validate().is_ok());
}

#[test]
fn integrations_add_requires_a_known_partner() {
    assert!(Cli::try_parse_from(["signalhub-cli", "integrations", "add"]).is_err());
    assert!(Cli::try_parse_from([
        "signalhub-cli",
        "integrations",
        "add",
        "--partner",
        "monster",
    ])
    .is_err());
}

#[test]
fn integrations_list_accepts_a_partner_filter() {
    let cli = Cli::try_parse_from(["signalhub-cli", "integrations", "list", "--partner", "linkedin"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Integrations {
            command: crate::integrations::IntegrationCommands::List {
                partner: Some(PartnerKind::LinkedIn)
            }
        })
    ));
}
