// ABOUTME: Pre-flight validation checks for sync prerequisites
// ABOUTME: Validates connectivity, source table readability and destination table writability

use crate::config::SyncSettings;
use crate::mssql::MssqlReader;
use crate::postgres::{check_table_privileges, connect_with_retry};
use crate::sync::query::build_select;
use crate::sync::TableMapping;
use crate::utils::redact_url;
use anyhow::Result;
use std::sync::Arc;

/// Individual check result
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Issue with suggested fixes
#[derive(Debug, Clone)]
pub struct PreflightIssue {
    pub title: String,
    pub explanation: String,
    pub fixes: Vec<String>,
}

/// Complete pre-flight results
#[derive(Debug, Default)]
pub struct PreflightResult {
    pub network: Vec<CheckResult>,
    pub source_tables: Vec<CheckResult>,
    pub target_tables: Vec<CheckResult>,
    pub issues: Vec<PreflightIssue>,
}

impl PreflightResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_passed(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.issues.len()
    }

    /// Whether the connectivity check called `name` ("source" or "target") passed.
    pub fn reachable(&self, name: &str) -> bool {
        self.network.iter().any(|c| c.name == name && c.passed)
    }

    /// Print formatted output
    pub fn print(&self) {
        println!();
        println!("Pre-flight Checks");
        println!("{}", "═".repeat(61));
        println!();

        print_section("Network Connectivity:", &self.network);
        print_section("SAP Source Tables:", &self.source_tables);
        print_section("PostgreSQL Destination Tables:", &self.target_tables);

        println!("{}", "═".repeat(61));
        if self.all_passed() {
            println!("PASSED: All pre-flight checks successful");
        } else {
            println!("FAILED: {} issue(s) must be resolved", self.failed_count());
            println!();
            for (i, issue) in self.issues.iter().enumerate() {
                println!("Issue {}: {}", i + 1, issue.title);
                println!("  {}", issue.explanation);
                println!();
                println!("  Fix options:");
                for fix in &issue.fixes {
                    println!("    • {}", fix);
                }
                println!();
            }
        }
    }
}

fn print_section(title: &str, checks: &[CheckResult]) {
    if checks.is_empty() {
        return;
    }
    println!("{}", title);
    for check in checks {
        let icon = if check.passed { "✓" } else { "✗" };
        println!("  {} {}", icon, check.message);
        if let Some(ref details) = check.details {
            println!("      {}", details);
        }
    }
    println!();
}

/// Run all pre-flight checks for `mappings`
///
/// Table checks only run for a side whose connectivity check passed. Failures are
/// collected into the result rather than returned as errors.
pub async fn run_preflight_checks(
    settings: &SyncSettings,
    mappings: &[Arc<TableMapping>],
) -> Result<PreflightResult> {
    let mut result = PreflightResult::new();

    let mut source = check_source_connectivity(&mut result, settings).await;
    let target = check_target_connectivity(&mut result, settings).await;

    if let Some(reader) = source.as_mut() {
        check_source_tables(&mut result, reader, mappings).await;
    }
    if let Some(client) = target.as_ref() {
        check_target_tables(&mut result, client, mappings).await;
    }

    Ok(result)
}

async fn check_source_connectivity(
    result: &mut PreflightResult,
    settings: &SyncSettings,
) -> Option<MssqlReader> {
    let connected =
        MssqlReader::connect(&settings.source_url, settings.max_retries, settings.retry_delay)
            .await;
    let outcome = match connected {
        Ok(mut reader) => reader.ping().await.map(|_| reader),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(reader) => {
            result.network.push(
                CheckResult::pass("source", "SAP SQL Server reachable")
                    .with_details(redact_url(&settings.source_url)),
            );
            Some(reader)
        }
        Err(e) => {
            result.network.push(CheckResult::fail(
                "source",
                format!("Cannot connect to SQL Server: {:#}", e),
            ));
            result.issues.push(PreflightIssue {
                title: "SAP SQL Server unreachable".to_string(),
                explanation: format!("{:#}", e),
                fixes: vec![
                    "Verify SAP_DB_URL or --source is correct".to_string(),
                    "Check network connectivity to the SQL Server host".to_string(),
                    "Ensure firewall allows SQL Server port (1433)".to_string(),
                    "For self-signed certificates add trust_server_certificate=true".to_string(),
                ],
            });
            None
        }
    }
}

async fn check_target_connectivity(
    result: &mut PreflightResult,
    settings: &SyncSettings,
) -> Option<tokio_postgres::Client> {
    match connect_with_retry(&settings.target_url, settings.max_retries, settings.retry_delay).await
    {
        Ok(client) => {
            result.network.push(
                CheckResult::pass("target", "PostgreSQL reachable")
                    .with_details(redact_url(&settings.target_url)),
            );
            Some(client)
        }
        Err(e) => {
            result.network.push(CheckResult::fail(
                "target",
                format!("Cannot connect to PostgreSQL: {:#}", e),
            ));
            result.issues.push(PreflightIssue {
                title: "PostgreSQL unreachable".to_string(),
                explanation: format!("{:#}", e),
                fixes: vec![
                    "Verify POSTGRES_URL or --target is correct".to_string(),
                    "Check network connectivity to database host".to_string(),
                    "Use --allow-self-signed-certs for self-signed servers".to_string(),
                ],
            });
            None
        }
    }
}

async fn check_source_tables(
    result: &mut PreflightResult,
    reader: &mut MssqlReader,
    mappings: &[Arc<TableMapping>],
) {
    for mapping in mappings {
        let query = build_select(mapping, None);
        match reader.probe_query(&query).await {
            Ok(()) => result.source_tables.push(CheckResult::pass(
                mapping.name(),
                format!(
                    "{}: {} readable ({} columns)",
                    mapping.name(),
                    mapping.source_table(),
                    mapping.columns().len()
                ),
            )),
            Err(e) => {
                result.source_tables.push(
                    CheckResult::fail(
                        mapping.name(),
                        format!("{}: cannot read {}", mapping.name(), mapping.source_table()),
                    )
                    .with_details(format!("{:#}", e)),
                );
                result.issues.push(PreflightIssue {
                    title: format!("Source table {} not readable", mapping.source_table()),
                    explanation: format!("{:#}", e),
                    fixes: vec![
                        format!("Run: GRANT SELECT ON {} TO <username>;", mapping.source_table()),
                        "Check that the SAP company database in the connection string is correct"
                            .to_string(),
                    ],
                });
            }
        }
    }
}

async fn check_target_tables(
    result: &mut PreflightResult,
    client: &tokio_postgres::Client,
    mappings: &[Arc<TableMapping>],
) {
    for mapping in mappings {
        let destination = mapping.destination();
        let privileges = match check_table_privileges(client, destination).await {
            Ok(privileges) => privileges,
            Err(e) => {
                result.target_tables.push(
                    CheckResult::fail(mapping.name(), format!("{}: failed to check", mapping.name()))
                        .with_details(format!("{:#}", e)),
                );
                continue;
            }
        };

        if privileges.is_ready() {
            result.target_tables.push(CheckResult::pass(
                mapping.name(),
                format!("{}: {} writable", mapping.name(), privileges.table),
            ));
            continue;
        }

        let (message, issue) = if !privileges.exists {
            (
                format!("{}: {} does not exist", mapping.name(), privileges.table),
                PreflightIssue {
                    title: format!("Destination table {} missing", privileges.table),
                    explanation: format!(
                        "Mapping {} writes {} fields into it",
                        mapping.name(),
                        destination.fields.len()
                    ),
                    fixes: vec!["Create the table with the declared fields and a primary key on the key columns".to_string()],
                },
            )
        } else if !privileges.missing_columns.is_empty() {
            (
                format!(
                    "{}: {} lacks {} column(s)",
                    mapping.name(),
                    privileges.table,
                    privileges.missing_columns.len()
                ),
                PreflightIssue {
                    title: format!("Destination table {} incomplete", privileges.table),
                    explanation: format!(
                        "Missing columns: {}",
                        privileges.missing_columns.join(", ")
                    ),
                    fixes: vec!["Run: ALTER TABLE ... ADD COLUMN for each missing column".to_string()],
                },
            )
        } else {
            let missing = privileges.missing_privileges().join(", ");
            (
                format!("{}: missing {} on {}", mapping.name(), missing, privileges.table),
                PreflightIssue {
                    title: format!("Missing privileges on {}", privileges.table),
                    explanation: format!("User needs {} on {}", missing, privileges.table),
                    fixes: vec![format!(
                        "Run: GRANT {} ON {} TO <username>;",
                        missing, privileges.table
                    )],
                },
            )
        };

        result
            .target_tables
            .push(CheckResult::fail(mapping.name(), message));
        result.issues.push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_pass() {
        let check = CheckResult::pass("test", "Test passed");
        assert!(check.passed);
        assert_eq!(check.name, "test");
    }

    #[test]
    fn test_check_result_fail() {
        let check = CheckResult::fail("test", "Test failed");
        assert!(!check.passed);
    }

    #[test]
    fn test_check_result_with_details() {
        let check = CheckResult::pass("test", "Test passed").with_details("Some details");
        assert_eq!(check.details, Some("Some details".to_string()));
    }

    #[test]
    fn test_preflight_result_empty_passes() {
        let result = PreflightResult::new();
        assert!(result.all_passed());
        assert_eq!(result.failed_count(), 0);
    }

    #[test]
    fn test_preflight_result_with_issues() {
        let mut result = PreflightResult::new();
        result.issues.push(PreflightIssue {
            title: "Test issue".to_string(),
            explanation: "Test".to_string(),
            fixes: vec![],
        });
        assert!(!result.all_passed());
        assert_eq!(result.failed_count(), 1);
    }

    #[test]
    fn test_reachable_requires_passed_check() {
        let mut result = PreflightResult::new();
        result.network.push(CheckResult::pass("target", "ok"));
        result.network.push(CheckResult::fail("source", "down"));
        assert!(result.reachable("target"));
        assert!(!result.reachable("source"));
    }

    #[tokio::test]
    async fn test_unreachable_hosts_become_issues() {
        let settings = SyncSettings {
            source_url: "mssql://sa:x@127.0.0.1:1/SBO".to_string(),
            target_url: "postgresql://u:p@127.0.0.1:1/erp".to_string(),
            batch_size: 10,
            max_workers: 1,
            max_retries: 0,
            retry_delay: std::time::Duration::from_millis(1),
            tables: vec![],
            interval: None,
        };

        let result = run_preflight_checks(&settings, &[]).await.unwrap();
        assert_eq!(result.failed_count(), 2);
        assert!(!result.reachable("source"));
        assert!(!result.reachable("target"));
        assert!(result.source_tables.is_empty());
        assert!(result.target_tables.is_empty());
    }
}
