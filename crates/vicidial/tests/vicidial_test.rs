//! # ViciDial Source Tests
//!
//! Exercises the HTTP side of `VicidialSession` against a `wiremock` server
//! standing in for the dialer.

use anyhow::Result;
use leadsync::sync::discover_lists;
use leadsync::{
    CampaignList, LeadDetailFetch, LeadSearch, ListProbe, RecordingSource, SourceError, SyncError,
};
use leadsync_vicidial::{VicidialConfig, VicidialError, VicidialSession};
use std::sync::Once;
use wiremock::matchers::{basic_auth, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

/// Initializes tracing for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().init();
    });
}

fn session_for(server: &MockServer) -> Result<VicidialSession> {
    Ok(VicidialSession::create(VicidialConfig {
        base_url: server.uri(),
        user: "apiuser".to_string(),
        pass: "secret".to_string(),
        request_timeout_secs: 5,
        ..VicidialConfig::default()
    })?)
}

fn list(id: &str) -> CampaignList {
    CampaignList {
        id: id.to_string(),
        name: "Trucking Leads".to_string(),
        campaign: "TRUCKS".to_string(),
        active: true,
    }
}

#[test]
fn test_session_requires_http_base_url() {
    let empty = VicidialSession::create(VicidialConfig::default());
    assert!(matches!(empty, Err(VicidialError::Config(_))));

    let ftp = VicidialSession::create(VicidialConfig {
        base_url: "ftp://dialer".to_string(),
        ..VicidialConfig::default()
    });
    assert!(matches!(ftp, Err(VicidialError::Config(_))));
}

#[test]
fn test_config_debug_hides_password() {
    let config = VicidialConfig {
        pass: "hunter2".to_string(),
        ..VicidialConfig::default()
    };
    assert!(!format!("{config:?}").contains("hunter2"));
}

#[tokio::test]
async fn test_probe_parses_list_info() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vicidial/non_agent_api.php"))
        .and(query_param("function", "list_info"))
        .and(query_param("list_id", "1001"))
        .and(query_param("user", "apiuser"))
        .and(query_param("stage", "pipe"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1001|Trucking Leads|TRUCKS|Y|42\n"))
        .mount(&server)
        .await;
    let session = session_for(&server)?;

    // --- Act ---
    let found = session.probe("1001").await?;

    // --- Assert ---
    let found = found.expect("list 1001 exists");
    assert_eq!(found.name, "Trucking Leads");
    assert_eq!(found.campaign, "TRUCKS");
    assert!(found.active);
    session.dispose();
    Ok(())
}

#[tokio::test]
async fn test_probe_treats_errors_as_missing_list() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vicidial/non_agent_api.php"))
        .and(query_param("list_id", "9999"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("ERROR: list_info LIST DOES NOT EXIST - 9999"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vicidial/non_agent_api.php"))
        .and(query_param("list_id", "1500"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let session = session_for(&server)?;

    // --- Act & Assert ---
    assert!(session.probe("9999").await?.is_none());
    assert!(session.probe("1500").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_is_a_connection_error() -> Result<()> {
    setup_tracing();
    let session = VicidialSession::create(VicidialConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        request_timeout_secs: 2,
        ..VicidialConfig::default()
    })?;
    let result = session.probe("1001").await;
    assert!(matches!(result, Err(SourceError::Connection(_))));
    Ok(())
}

/// Accepts every connection and closes it before answering.
async fn spawn_dropping_server() -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn test_dropped_connections_make_the_source_unreachable() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let session = VicidialSession::create(VicidialConfig {
        base_url: spawn_dropping_server().await?,
        request_timeout_secs: 5,
        ..VicidialConfig::default()
    })?;

    // --- Act ---
    let probed = session.probe("1001").await;
    let discovered = discover_lists(&session, &["1001".to_string(), "1002".to_string()]).await;

    // --- Assert ---
    assert!(matches!(probed, Err(SourceError::Connection(_))));
    assert!(matches!(discovered, Err(SyncError::SourceUnreachable(_))));
    Ok(())
}

#[tokio::test]
async fn test_enumerate_reads_list_links() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let page = r#"<table>
        <tr><td><a href="admin.php?ADD=311&list_id=1003">1003</a></td></tr>
        <tr><td><a href="admin.php?ADD=311&list_id=1001">1001</a></td></tr>
        <tr><td><a href="admin.php?ADD=311&list_id=1003">modify</a></td></tr>
    </table>"#;
    Mock::given(method("GET"))
        .and(path("/vicidial/admin.php"))
        .and(query_param("ADD", "100"))
        .and(basic_auth("apiuser", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;
    let session = session_for(&server)?;

    // --- Act ---
    let ids = session.enumerate().await?;

    // --- Assert ---
    assert_eq!(ids, vec!["1003", "1001"]);
    Ok(())
}

#[tokio::test]
async fn test_search_uses_list_form_first() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let results = r#"
        <a href="admin_modify_lead.php?lead_id=501&archive_search=No">501</a>
        <a href="admin_modify_lead.php?lead_id=502&archive_search=No">502</a>
        <a href="admin_modify_lead.php?lead_id=501&archive_search=No">501</a>"#;
    Mock::given(method("POST"))
        .and(path("/vicidial/admin_search_lead.php"))
        .and(body_string_contains("list_id=1001"))
        .and(body_string_contains("status=SALE"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vicidial/admin_search_lead.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(0)
        .mount(&server)
        .await;
    let session = session_for(&server)?;

    // --- Act ---
    let ids = session.search(&list("1001"), "SALE").await?;

    // --- Assert ---
    assert_eq!(ids, vec!["501", "502"]);
    Ok(())
}

#[tokio::test]
async fn test_search_falls_back_to_status_search() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vicidial/admin_search_lead.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vicidial/admin_search_lead.php"))
        .and(query_param("status", "SALE"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<a href="admin_modify_lead.php?lead_id=777">777</a>"#),
        )
        .mount(&server)
        .await;
    let session = session_for(&server)?;

    // --- Act ---
    let ids = session.search(&list("1001"), "SALE").await?;

    // --- Assert ---
    assert_eq!(ids, vec!["777"]);
    Ok(())
}

#[tokio::test]
async fn test_search_with_no_results_is_empty() -> Result<()> {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(path("/vicidial/admin_search_lead.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>no results</p>"))
        .mount(&server)
        .await;
    let session = session_for(&server)?;
    assert!(session.search(&list("1001"), "SALE").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fetch_reads_lead_form() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let form = r#"<html><body><form action="admin_modify_lead.php" method="post">
        <input type="hidden" name="lead_id" value="501">
        <input type="text" name="first_name" value="Dana">
        <input type="text" name="last_name" value="Reyes">
        <input type="text" name="phone_number" value="5551230001">
        <textarea name="comments">USDOT 7654321, 3 trucks</textarea>
        <input type="submit" name="submit" value="SUBMIT">
    </form></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/vicidial/admin_modify_lead.php"))
        .and(query_param("lead_id", "501"))
        .respond_with(ResponseTemplate::new(200).set_body_string(form))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vicidial/admin_modify_lead.php"))
        .and(query_param("lead_id", "404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let session = session_for(&server)?;

    // --- Act ---
    let fields = session.fetch("501").await?.expect("lead form");
    let missing = session.fetch("404").await?;

    // --- Assert ---
    assert_eq!(fields["first_name"], "Dana");
    assert_eq!(fields["phone_number"], "5551230001");
    assert_eq!(fields["comments"], "USDOT 7654321, 3 trucks");
    assert!(missing.is_none());
    Ok(())
}

#[tokio::test]
async fn test_recording_lookup_picks_latest_and_downloads() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let listing = r#"<html><body><pre>
        <a href="?C=M;O=A">Last modified</a>
        <a href="20260301-090000_5551230001-all.mp3">20260301-090000_5551230001-all.mp3</a>
        <a href="20260305-141500_5551230001-all.mp3">20260305-141500_5551230001-all.mp3</a>
        <a href="20260306-080000_5559990000-all.mp3">20260306-080000_5559990000-all.mp3</a>
    </pre></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/RECORDINGS/MP3/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/RECORDINGS/MP3/20260305-141500_5551230001-all.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake-audio".to_vec()))
        .mount(&server)
        .await;
    let session = session_for(&server)?;

    // --- Act ---
    let recording = session
        .find("+1 (555) 123-0001")
        .await?
        .expect("a matching recording");
    let audio = session.download(&recording).await?;
    let bytes = std::fs::read(&audio)?;
    let kept_at = audio.to_path_buf();
    drop(audio);

    // --- Assert ---
    assert_eq!(recording.file_name, "20260305-141500_5551230001-all.mp3");
    assert_eq!(recording.candidates, 2);
    assert_eq!(bytes, b"ID3fake-audio");
    assert!(kept_at.extension().is_some_and(|ext| ext == "mp3"));
    assert!(!kept_at.exists());
    Ok(())
}

#[tokio::test]
async fn test_recording_lookup_without_match_is_none() -> Result<()> {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/RECORDINGS/MP3/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<a href="20260306-080000_5559990000-all.mp3">x</a>"#),
        )
        .mount(&server)
        .await;
    let session = session_for(&server)?;
    assert!(session.find("5551230001").await?.is_none());
    assert!(session.find("").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_failed_download_leaves_no_file() -> Result<()> {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let session = session_for(&server)?;
    let recording = leadsync::Recording {
        file_name: "gone.mp3".to_string(),
        url: format!("{}/RECORDINGS/MP3/gone.mp3", server.uri()),
        candidates: 1,
    };
    let result = session.download(&recording).await;
    assert!(matches!(result, Err(SourceError::Status { status: 404, .. })));
    Ok(())
}
