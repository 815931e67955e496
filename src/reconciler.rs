use std::{
    fmt::{Debug, Display, Formatter},
    io,
    net::Ipv4Addr,
};
use tracing::{info, warn};
use crate::{
    operator::{Confirm, CredentialSource},
    registrar::{ApiResult, Registrar, RemoteRecord},
};

const ROOT: &str = "@";
const WWW: &str = "www";

/// Target state of the zone: `@ A <root_ip>` and `www CNAME <www_target>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecordSet {
    pub domain: String,
    pub root_ip: Ipv4Addr,
    pub www_target: String,
}

impl DesiredRecordSet {
    pub fn root_name(&self) -> &'static str {
        ROOT
    }

    pub fn www_name(&self) -> &'static str {
        WWW
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operator declined; nothing was changed.
    Cancelled,
    Applied(Summary),
}

/// Per-step results of an applied run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub cleared: ApiResult,
    pub root_record: ApiResult,
    pub www_record: ApiResult,
    pub records: ApiResult<Vec<RemoteRecord>>,
}

#[derive(Debug)]
pub struct Reconciler<R: Registrar> {
    registrar: R,
    desired: DesiredRecordSet,
}

impl<R: Registrar> Reconciler<R> {
    pub fn new(registrar: R, desired: DesiredRecordSet) -> Self {
        Self { registrar, desired }
    }

    pub fn desired(&self) -> &DesiredRecordSet {
        &self.desired
    }

    /// Tests the credentials, asks for confirmation, then clears the zone and
    /// adds both records. Only a transport error, a rejected credential test or
    /// a prompt failure stop the run early.
    #[tracing::instrument(skip_all, fields(domain = %self.desired.domain))]
    pub async fn run<S, C>(&self, source: &S, confirm: &C) -> Result<Outcome, ReconcileError<R>>
    where
        S: CredentialSource + ?Sized,
        C: Confirm + ?Sized,
    {
        let creds = source.credentials()?;
        let desired = &self.desired;

        println!("Testing API connection...");
        let test = self.registrar.test_credentials(&creds)
            .await
            .map_err(ReconcileError::RegistrarError)?;
        if let Some(e) = test.error_message() {
            println!("❌ API connection failed: {}", e);
            return Err(ReconcileError::AuthenticationFailed(e.to_owned()));
        }
        println!("✅ API connection successful!");

        if !confirm.confirm(desired)? {
            info!("operator declined");
            println!("Cancelled.");
            return Ok(Outcome::Cancelled);
        }

        println!();
        println!("Clearing existing DNS records for {}...", desired.domain);
        let cleared = self.registrar.clear_zone(&creds, &desired.domain)
            .await
            .map_err(ReconcileError::RegistrarError)?;
        match clear_warning(&cleared) {
            None => println!("✅ DNS records cleared successfully!"),
            Some(line) => {
                // Not fatal: the zone may already be empty.
                warn!(error = ?cleared, "could not clear zone");
                println!("{}", line);
            }
        }

        println!();
        println!("Adding A record for {}...", desired.domain);
        let root_record = self.registrar
            .add_alias(&creds, &desired.domain, ROOT, desired.root_ip)
            .await
            .map_err(ReconcileError::RegistrarError)?;
        match root_record.error_message() {
            None => println!("✅ A record added: {} → {}", ROOT, desired.root_ip),
            Some(e) => println!("❌ Failed to add A record: {}", e),
        }

        println!();
        println!("Adding CNAME record for {}.{}...", WWW, desired.domain);
        let www_record = self.registrar
            .add_cname(&creds, &desired.domain, WWW, &desired.www_target)
            .await
            .map_err(ReconcileError::RegistrarError)?;
        match www_record.error_message() {
            None => println!("✅ CNAME record added: {} → {}", WWW, desired.www_target),
            Some(e) => println!("❌ Failed to add CNAME record: {}", e),
        }

        println!();
        println!("Fetching current DNS records for {}...", desired.domain);
        let records = self.registrar.get_resource_records(&creds, &desired.domain)
            .await
            .map_err(ReconcileError::RegistrarError)?;
        if let Some(e) = records.error_message() {
            println!("❌ Failed to fetch DNS records: {}", e);
        }

        info!(
            cleared = cleared.is_success(),
            root = root_record.is_success(),
            www = www_record.is_success(),
            "zone reconciled"
        );

        Ok(Outcome::Applied(Summary {
            cleared,
            root_record,
            www_record,
            records,
        }))
    }
}

/// Warning shown when clearing fails. A missing server message leaves the
/// text after the colon empty.
fn clear_warning(cleared: &ApiResult) -> Option<String> {
    match cleared {
        ApiResult::Success(()) => None,
        ApiResult::Failure(e) => Some(format!(
            "⚠️  Warning: Could not clear DNS records: {}",
            e.as_deref().unwrap_or_default(),
        )),
    }
}

#[derive(Debug)]
pub enum ReconcileError<R: Registrar> {
    PromptError(io::Error),
    AuthenticationFailed(String),
    RegistrarError(R::Error),
}

impl<R: Registrar> From<io::Error> for ReconcileError<R> {
    fn from(e: io::Error) -> Self {
        ReconcileError::PromptError(e)
    }
}

impl<R: Registrar> Display for ReconcileError<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::PromptError(e) => write!(f, "reading operator input: {}", e),
            ReconcileError::AuthenticationFailed(e) => write!(f, "API connection failed: {}", e),
            ReconcileError::RegistrarError(e) => Display::fmt(e, f),
        }
    }
}

impl<R: Registrar + Debug> std::error::Error for ReconcileError<R> {}

#[cfg(test)]
mod tests {
    use httptest::{matchers::request, responders::*, Expectation, Server};
    use mockall::{predicate::eq, Sequence};
    use serde_json::json;
    use crate::{
        operator::{MockConfirm, MockCredentialSource},
        registrar::{regru::RegRuClient, Credentials, MockRegistrar, MockTransportError},
    };
    use super::*;

    fn desired() -> DesiredRecordSet {
        DesiredRecordSet {
            domain: "vnvnc.ru".into(),
            root_ip: Ipv4Addr::new(76, 76, 21, 21),
            www_target: "cname.vercel-dns.com".into(),
        }
    }

    fn creds() -> Credentials {
        Credentials::new("test", "test")
    }

    fn confirming(answer: bool) -> MockConfirm {
        let mut confirm = MockConfirm::new();
        confirm.expect_confirm()
            .with(eq(desired()))
            .times(1)
            .returning(move |_| Ok(answer));
        confirm
    }

    fn accepted_credentials(registrar: &mut MockRegistrar) {
        registrar.expect_test_credentials()
            .times(1)
            .returning(|_| Ok(ApiResult::Success(())));
    }

    #[tokio::test]
    async fn applies_steps_in_order_with_configured_values() {
        let mut seq = Sequence::new();
        let mut registrar = MockRegistrar::new();
        registrar.expect_test_credentials()
            .withf(|c| c.username == "test")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResult::Success(())));
        registrar.expect_clear_zone()
            .withf(|_, domain| domain == "vnvnc.ru")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ApiResult::Success(())));
        registrar.expect_add_alias()
            .withf(|_, domain, sub, ip| {
                domain == "vnvnc.ru" && sub == "@" && *ip == Ipv4Addr::new(76, 76, 21, 21)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(ApiResult::Success(())));
        registrar.expect_add_cname()
            .withf(|_, domain, sub, target| {
                domain == "vnvnc.ru" && sub == "www" && target == "cname.vercel-dns.com"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(ApiResult::Success(())));
        registrar.expect_get_resource_records()
            .withf(|_, domain| domain == "vnvnc.ru")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ApiResult::Success(Vec::new())));

        let reconciler = Reconciler::new(registrar, desired());
        let outcome = reconciler.run(&creds(), &confirming(true)).await.unwrap();

        assert_eq!(outcome, Outcome::Applied(Summary {
            cleared: ApiResult::Success(()),
            root_record: ApiResult::Success(()),
            www_record: ApiResult::Success(()),
            records: ApiResult::Success(Vec::new()),
        }));
    }

    #[tokio::test]
    async fn rejected_credentials_stop_before_confirmation() {
        let mut registrar = MockRegistrar::new();
        registrar.expect_test_credentials()
            .times(1)
            .returning(|_| Ok(ApiResult::Failure(Some("Invalid password".into()))));

        // No expectations: any prompt or mutating call panics.
        let confirm = MockConfirm::new();

        let reconciler = Reconciler::new(registrar, desired());
        let err = reconciler.run(&creds(), &confirm).await.unwrap_err();

        assert!(matches!(err, ReconcileError::AuthenticationFailed(ref e) if e == "Invalid password"));
    }

    #[tokio::test]
    async fn declined_confirmation_changes_nothing() {
        let mut registrar = MockRegistrar::new();
        accepted_credentials(&mut registrar);

        let reconciler = Reconciler::new(registrar, desired());
        let outcome = reconciler.run(&creds(), &confirming(false)).await.unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn clear_failure_does_not_block_adds() {
        let mut registrar = MockRegistrar::new();
        accepted_credentials(&mut registrar);
        registrar.expect_clear_zone()
            .times(1)
            .returning(|_, _| Ok(ApiResult::Failure(Some("zone is empty".into()))));
        registrar.expect_add_alias()
            .times(1)
            .returning(|_, _, _, _| Ok(ApiResult::Success(())));
        registrar.expect_add_cname()
            .times(1)
            .returning(|_, _, _, _| Ok(ApiResult::Failure(None)));
        registrar.expect_get_resource_records()
            .times(1)
            .returning(|_, _| Ok(ApiResult::Failure(None)));

        let reconciler = Reconciler::new(registrar, desired());
        let outcome = reconciler.run(&creds(), &confirming(true)).await.unwrap();

        let summary = match outcome {
            Outcome::Applied(summary) => summary,
            Outcome::Cancelled => panic!("run was cancelled"),
        };
        assert_eq!(summary.cleared, ApiResult::Failure(Some("zone is empty".into())));
        assert!(summary.root_record.is_success());
        assert!(!summary.www_record.is_success());
        assert!(!summary.records.is_success());
    }

    #[tokio::test]
    async fn transport_error_stops_the_run() {
        let mut registrar = MockRegistrar::new();
        accepted_credentials(&mut registrar);
        registrar.expect_clear_zone()
            .times(1)
            .returning(|_, _| Err(MockTransportError));

        let reconciler = Reconciler::new(registrar, desired());
        let err = reconciler.run(&creds(), &confirming(true)).await.unwrap_err();

        assert!(matches!(err, ReconcileError::RegistrarError(MockTransportError)));
    }

    #[tokio::test]
    async fn prompt_failure_is_fatal() {
        let mut source = MockCredentialSource::new();
        source.expect_credentials()
            .times(1)
            .returning(|| Err(io::Error::new(io::ErrorKind::UnexpectedEof, "closed")));

        let reconciler = Reconciler::new(MockRegistrar::new(), desired());
        let err = reconciler.run(&source, &MockConfirm::new()).await.unwrap_err();

        assert!(matches!(err, ReconcileError::PromptError(_)));
    }

    fn regru(server: &Server) -> Reconciler<RegRuClient> {
        let client = RegRuClient::new(server.url_str("/"), None).unwrap();
        Reconciler::new(client, desired())
    }

    #[tokio::test]
    async fn end_to_end_happy_path() {
        let server = Server::run();
        for path in ["/nop", "/zone/clear", "/zone/add_alias", "/zone/add_cname"] {
            server.expect(
                Expectation::matching(request::method_path("POST", path))
                    .times(1)
                    .respond_with(json_encoded(json!({"result": "success"}))),
            );
        }
        server.expect(
            Expectation::matching(request::method_path("POST", "/zone/get_resource_records"))
                .times(1)
                .respond_with(json_encoded(json!({
                    "result": "success",
                    "answer": {"vnvnc.ru": {"rrs": [
                        {"type": "A", "subdomain": "@", "ipaddr": "76.76.21.21"},
                    ]}},
                }))),
        );

        let outcome = regru(&server).run(&creds(), &confirming(true)).await.unwrap();

        let summary = match outcome {
            Outcome::Applied(summary) => summary,
            Outcome::Cancelled => panic!("run was cancelled"),
        };
        match summary.records {
            ApiResult::Success(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].to_string(), "A: @ → 76.76.21.21");
            }
            ApiResult::Failure(e) => panic!("read-back failed: {:?}", e),
        }
    }

    #[tokio::test]
    async fn end_to_end_invalid_credentials_make_one_call() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/nop"))
                .times(1)
                .respond_with(json_encoded(json!({"result": "error", "error": "bad credentials"}))),
        );

        let err = regru(&server).run(&creds(), &MockConfirm::new()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn end_to_end_declined_makes_one_call() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/nop"))
                .times(1)
                .respond_with(json_encoded(json!({"result": "success"}))),
        );

        let outcome = regru(&server).run(&creds(), &confirming(false)).await.unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn end_to_end_non_200_stops_further_calls() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/nop"))
                .times(1)
                .respond_with(json_encoded(json!({"result": "success"}))),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/zone/clear"))
                .times(1)
                .respond_with(status_code(502)),
        );

        let err = regru(&server).run(&creds(), &confirming(true)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::RegistrarError(_)));
    }

    #[test]
    fn clear_warning_omits_missing_message() {
        assert_eq!(clear_warning(&ApiResult::Success(())), None);
        assert_eq!(
            clear_warning(&ApiResult::Failure(None)).as_deref(),
            Some("⚠️  Warning: Could not clear DNS records: "),
        );
        assert_eq!(
            clear_warning(&ApiResult::Failure(Some("zone is empty".into()))).as_deref(),
            Some("⚠️  Warning: Could not clear DNS records: zone is empty"),
        );
    }

    #[test]
    fn authentication_failure_reads_as_one_line() {
        let err: ReconcileError<MockRegistrar> =
            ReconcileError::AuthenticationFailed("Invalid password".into());
        assert_eq!(err.to_string(), "API connection failed: Invalid password");
    }

    #[tokio::test]
    async fn end_to_end_unexpected_record_shape_keeps_run_successful() {
        let server = Server::run();
        for path in ["/nop", "/zone/clear", "/zone/add_alias", "/zone/add_cname"] {
            server.expect(
                Expectation::matching(request::method_path("POST", path))
                    .times(1)
                    .respond_with(json_encoded(json!({"result": "success"}))),
            );
        }
        server.expect(
            Expectation::matching(request::method_path("POST", "/zone/get_resource_records"))
                .times(1)
                .respond_with(json_encoded(json!({
                    "result": "success",
                    "answer": {"vnvnc.ru": {"rrs": [
                        {"rectype": "A", "subname": "@", "content": "76.76.21.21"},
                    ]}},
                }))),
        );

        let outcome = regru(&server).run(&creds(), &confirming(true)).await.unwrap();

        let summary = match outcome {
            Outcome::Applied(summary) => summary,
            Outcome::Cancelled => panic!("run was cancelled"),
        };
        match summary.records {
            ApiResult::Success(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].to_string(), "A: @ → 76.76.21.21");
            }
            ApiResult::Failure(e) => panic!("read-back failed: {:?}", e),
        }
    }
}
