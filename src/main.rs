use clap::{Arg, ArgAction, Command};
use email_privacy_filter::filter::FilterResult;
use email_privacy_filter::templates::{self, TEMPLATE_NAMES};
use email_privacy_filter::{
    attach_policy, AttachMethod, Config, MailContext, Notification, Notifier, Policy,
    PrivacyEngine,
};
use log::LevelFilter;
use std::process;

const DEMO_HR_POLICY: &str = "PFByaXZhY3lQb2xpY3k+PG1ldGFkYXRhPjxjcmVhdG9yPmhyQGNvbXBhbnkuY29tPC9jcmVhdG9yPjwvbWV0YWRhdGE+PHJ1bGVzPjxydWxlIGlkPSJuby1mb3J3YXJkIj48ZGVzY3JpcHRpb24+V2FybiBhYm91dCBmb3J3YXJkaW5nPC9kZXNjcmlwdGlvbj48YWN0aW9uIHR5cGU9Indhcm4iIG1lc3NhZ2U9IkRvIG5vdCBmb3J3YXJkIHRoaXMgZW1haWwiLz48L3J1bGU+PC9ydWxlcz48L1ByaXZhY3lQb2xpY3k+";

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: &Notification) {
        println!("🔔 {}: {}", notification.title, notification.message);
    }
}

fn main() {
    let matches = Command::new("email-privacy-filter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Applies embedded email privacy policies and strips tracking content")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/email-privacy-filter.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("decode-policy")
                .long("decode-policy")
                .value_name("BASE64")
                .help("Decode an encoded privacy policy and print its rules")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("template")
                .long("template")
                .value_name("NAME")
                .help("Print an encoded policy built from a template (no-forwarding, tracking-protection, attachment-control, strict)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("creator")
                .long("creator")
                .value_name("ADDRESS")
                .help("Creator recorded in a template policy")
                .default_value("unknown"),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Inspect a raw email file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("policy")
                .long("policy")
                .value_name("BASE64")
                .help("Policy to apply with --test-email instead of the X-Privacy-Policy header")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("attach-policy")
                .long("attach-policy")
                .value_name("FILE")
                .help("Print a raw email with a policy embedded (from --policy or --template)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("attach-method")
                .long("attach-method")
                .value_name("METHOD")
                .help("How --attach-policy embeds the policy (header, mime, both)")
                .default_value("both"),
        )
        .arg(
            Arg::new("check-policy")
                .long("check-policy")
                .value_name("FILE")
                .help("Report whether a raw email carries a readable policy")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .help("Run the built-in demonstration scenarios")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let json = matches.get_flag("json");

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    if let Some(encoded) = matches.get_one::<String>("decode-policy") {
        match email_privacy_filter::decode(encoded) {
            Ok(policy) => print_policy(&policy, json),
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Some(email_file) = matches.get_one::<String>("attach-policy") {
        if let Err(e) = attach_policy_file(&matches, email_file) {
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
        return;
    }

    if let Some(email_file) = matches.get_one::<String>("check-policy") {
        if let Err(e) = check_policy_file(email_file, json) {
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
        return;
    }

    if let Some(name) = matches.get_one::<String>("template") {
        let creator = matches
            .get_one::<String>("creator")
            .map(String::as_str)
            .unwrap_or("unknown");
        match templates::by_name(name, creator) {
            Some(policy) => println!("{}", policy.encode()),
            None => {
                eprintln!(
                    "❌ Unknown template '{name}', expected one of: {}",
                    TEMPLATE_NAMES.join(", ")
                );
                process::exit(1);
            }
        }
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/email-privacy-filter.yaml");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!("🔍 Testing configuration...");
        match PrivacyEngine::new(&config, Box::new(ConsoleNotifier)) {
            Ok(_) => {
                println!("Settings: {:?}", config.settings);
                println!("History capacity: {}", config.history_capacity);
                println!("Tracking keywords: {}", config.tracking_keywords.join(", "));
                println!("Blocked extensions: {}", config.blocked_extensions.join(", "));
                println!("✅ Configuration is valid");
            }
            Err(e) => {
                println!("❌ Configuration validation failed:");
                println!("Error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let engine = match PrivacyEngine::new(&config, Box::new(ConsoleNotifier)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error initializing privacy engine: {e}");
            process::exit(1);
        }
    };

    if let Some(email_file) = matches.get_one::<String>("test-email") {
        let policy = matches.get_one::<String>("policy").map(String::as_str);
        if let Err(e) = test_email_file(&engine, email_file, policy, json) {
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
        return;
    }

    if matches.get_flag("demo") {
        run_demo(&engine, json);
        return;
    }

    println!("Nothing to do. Try --demo, --test-email FILE or --decode-policy BASE64.");
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn print_policy(policy: &Policy, json: bool) {
    if json {
        match serde_json::to_string_pretty(policy) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("❌ Failed to serialize policy: {e}"),
        }
        return;
    }

    println!("📜 Policy by {}", policy.creator);
    if policy.rules.is_empty() {
        println!("   (no rules)");
    }
    for rule in &policy.rules {
        println!(
            "   [{}] {} -> {}: {}",
            rule.id, rule.description, rule.action.kind, rule.action.message
        );
    }
}

fn print_result(result: &FilterResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("❌ Failed to serialize result: {e}"),
        }
        return;
    }

    println!("📊 Result:");
    println!("   Tracking stripped: {}", result.tracking_stripped);
    println!("   External images: {}", result.external_images);
    if result.attachments_allowed {
        println!("   Attachments: allowed");
    } else {
        println!(
            "   Attachments: BLOCKED ({})",
            result.blocked_attachments.join(", ")
        );
    }
    for action in &result.actions {
        println!(
            "   Rule {} ({}) applied: {}",
            action.rule_id, action.action_kind, action.applied
        );
    }
}

fn test_email_file(
    engine: &PrivacyEngine,
    email_file: &str,
    policy: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let raw = std::fs::read_to_string(email_file)
        .with_context(|| format!("Failed to read email file: {email_file}"))?;
    let mail = MailContext::from_raw(&raw);

    if !json {
        println!("🧪 Testing email file: {email_file}");
        println!("📧 Email Details:");
        if let Some(from) = &mail.from_header {
            println!("   From: {from}");
        }
        if let Some(subject) = &mail.subject {
            println!("   Subject: {subject}");
        }
        match (policy, mail.policy_source()) {
            (Some(encoded), _) => println!("   Policy: {}", truncate_string(encoded, 60)),
            (None, Some(source)) => println!("   Policy: embedded in {source}"),
            (None, None) => {}
        }
        for attachment in &mail.attachments {
            println!("   Attachment: {}", attachment.name);
        }
        println!();
    }

    let result = engine
        .process(&mail, policy)
        .context("Failed to decode privacy policy")?;
    print_result(&result, json);
    Ok(())
}

fn attach_policy_file(matches: &clap::ArgMatches, email_file: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let method: AttachMethod = matches
        .get_one::<String>("attach-method")
        .map(String::as_str)
        .unwrap_or("both")
        .parse()?;

    let policy = if let Some(encoded) = matches.get_one::<String>("policy") {
        email_privacy_filter::decode(encoded).context("Failed to decode --policy")?
    } else if let Some(name) = matches.get_one::<String>("template") {
        let creator = matches
            .get_one::<String>("creator")
            .map(String::as_str)
            .unwrap_or("unknown");
        templates::by_name(name, creator).with_context(|| {
            format!(
                "Unknown template '{name}', expected one of: {}",
                TEMPLATE_NAMES.join(", ")
            )
        })?
    } else {
        anyhow::bail!("--attach-policy needs --policy or --template");
    };

    let raw = std::fs::read_to_string(email_file)
        .with_context(|| format!("Failed to read email file: {email_file}"))?;
    print!("{}", attach_policy(&raw, &policy, method));
    Ok(())
}

fn check_policy_file(email_file: &str, json: bool) -> anyhow::Result<()> {
    use anyhow::Context;

    let raw = std::fs::read_to_string(email_file)
        .with_context(|| format!("Failed to read email file: {email_file}"))?;
    let report = MailContext::from_raw(&raw).validate_policy_integrity();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("🔍 Policy integrity: {email_file}");
    println!("   Header: {}", report.has_header);
    println!("   MIME part: {}", report.has_mime_part);
    println!("   Extractable: {}", report.extractable);
    for error in &report.errors {
        println!("   ⚠️  {error}");
    }
    if let Some(policy) = &report.policy {
        print_policy(policy, false);
    }
    Ok(())
}

fn run_demo(engine: &PrivacyEngine, json: bool) {
    println!("🎯 Simulating email detection");
    println!("{}", "=".repeat(50));

    let newsletter = MailContext {
        subject: Some("Regular Newsletter".to_string()),
        from_header: Some("news@example.com".to_string()),
        body: Some("Check out our products! <img src=\"https://tracker.com/pixel.gif\">".to_string()),
        ..Default::default()
    };
    let hr_report = MailContext {
        subject: Some("HR Confidential Report".to_string()),
        from_header: Some("hr@company.com".to_string()),
        body: Some("<p>Quarterly figures attached.</p>".to_string()),
        ..Default::default()
    };

    for (index, (mail, policy)) in [(newsletter, None), (hr_report, Some(DEMO_HR_POLICY))]
        .iter()
        .enumerate()
    {
        println!();
        println!(
            "[SIM] Email {}: \"{}\"",
            index + 1,
            mail.subject.as_deref().unwrap_or_default()
        );
        match engine.process(mail, *policy) {
            Ok(result) => {
                println!(
                    "[SIM] Content filtering applied: {}",
                    result.content != mail.content()
                );
                print_result(&result, json);
            }
            Err(e) => println!("❌ Error processing policy: {e}"),
        }
    }

    println!();
    println!("Current settings: {:?}", engine.settings());
    let history = engine.history();
    println!("Policy history: {} entries", history.len());
    for entry in engine.recent_history(10) {
        println!(
            "   {} {} | Rules: {} | Actions: {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.email.subject,
            entry.rules.len(),
            entry.actions.len()
        );
    }
}
