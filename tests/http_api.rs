//! HTTP round trip against a locally bound server: cookie-scoped clients,
//! auth actions, guard-protected data endpoints.

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use medilink::config::PortalConfig;
use medilink::identity::HashCost;
use medilink::server::{self, AppState};

async fn start() -> Result<String> {
    let config = PortalConfig { hash_cost: HashCost::Fast, ..PortalConfig::default() };
    let state = AppState::build(&config)?;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            eprintln!("server exited: {}", e);
        }
    });
    Ok(format!("http://{}", addr))
}

fn browser() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().cookie_store(true).build()?)
}

async fn get(c: &reqwest::Client, url: String) -> Result<(StatusCode, Value)> {
    let res = c.get(url).send().await?;
    let status = res.status();
    Ok((status, res.json().await?))
}

async fn post(c: &reqwest::Client, url: String, body: Value) -> Result<(StatusCode, Value)> {
    let res = c.post(url).json(&body).send().await?;
    let status = res.status();
    Ok((status, res.json().await?))
}

#[tokio::test]
async fn health_and_initial_state() -> Result<()> {
    let base = start().await?;
    let c = browser()?;
    let text = c.get(format!("{}/", base)).send().await?.text().await?;
    assert_eq!(text, "medilink ok");

    let (status, body) = get(&c, format!("{}/auth/state", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["state"], "unauthenticated");
    assert_eq!(body["is_demo_mode"], false);
    Ok(())
}

#[tokio::test]
async fn patient_session_round_trip() -> Result<()> {
    let base = start().await?;
    let c = browser()?;

    let (status, body) = get(&c, format!("{}/api/records", base)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["location"], "/login?from=%2Frecords");

    let (status, body) = post(
        &c,
        format!("{}/auth/sign-in", base),
        json!({"email":"jane@example.com","password":"password","return_to":"/records"}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"], json!({"state":"authenticated","role":"patient"}));
    assert_eq!(body["effects"][0]["effect"], "navigate");
    assert_eq!(body["effects"][0]["path"], "/records");

    let (status, body) = get(&c, format!("{}/api/records?category=imaging", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"].as_array().map(Vec::len), Some(1));

    let (status, body) = get(&c, format!("{}/api/messages?unread=true", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unread"], 1);

    let (status, body) = get(&c, format!("{}/api/tasks", base)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["location"], "/dashboard");

    let (status, body) = get(&c, format!("{}/nav?path=/appointments", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["guard"]["decision"], "allow");
    assert_eq!(body["nav"].as_array().map(Vec::len), Some(5));

    let res = c.patch(format!("{}/profile", base)).json(&json!({"phone":"(555) 222-3333"})).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["state"]["profile"]["phone"], "(555) 222-3333");

    let (status, body) = post(&c, format!("{}/auth/sign-out", base), json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"]["state"], "unauthenticated");
    let (status, _) = get(&c, format!("{}/api/messages", base)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_map_to_401() -> Result<()> {
    let base = start().await?;
    let c = browser()?;
    let (status, body) =
        post(&c, format!("{}/auth/sign-in", base), json!({"email":"jane@example.com","password":"nope-nope"})).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");
    Ok(())
}

#[tokio::test]
async fn demo_persona_follows_the_endpoint() -> Result<()> {
    let base = start().await?;
    let c = browser()?;

    let (status, body) = post(&c, format!("{}/auth/demo", base), json!({"role":"patient"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"], json!({"state":"demo_active","role":"patient"}));
    assert_eq!(body["effects"][0]["path"], "/dashboard");

    // Provider data switches the persona rather than refusing.
    let (status, body) = get(&c, format!("{}/api/patients?q=jane", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profiles"][0]["id"], "p1");
    assert_eq!(body["records"][0]["name"], "Jane Smith");

    let (_, body) = get(&c, format!("{}/auth/state", base)).await?;
    assert_eq!(body["status"], json!({"state":"demo_active","role":"provider"}));

    let (status, body) = get(&c, format!("{}/api/dashboard?date=2025-04-15", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dashboard"]["role"], "provider");
    assert_eq!(body["dashboard"]["todays_appointments"][0]["id"], "a1");

    let res = c.patch(format!("{}/profile", base)).json(&json!({"full_name":"Changed"})).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn clients_are_isolated_by_cookie() -> Result<()> {
    let base = start().await?;
    let alice = browser()?;
    let bob = browser()?;

    let (status, _) =
        post(&alice, format!("{}/auth/sign-in", base), json!({"email":"dr.johnson@example.com","password":"password"}))
            .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&bob, format!("{}/auth/state", base)).await?;
    assert_eq!(body["status"]["state"], "unauthenticated");
    let (status, body) = get(&alice, format!("{}/api/tasks", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn sign_up_then_unknown_route() -> Result<()> {
    let base = start().await?;
    let c = browser()?;
    let (status, body) = post(
        &c,
        format!("{}/auth/sign-up", base),
        json!({"email":"fresh@example.com","password":"secret1","full_name":"Fresh Face","user_type":"patient"}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requires_verification"], false);

    let (status, _) = post(
        &c,
        format!("{}/auth/sign-up", base),
        json!({"email":"fresh@example.com","password":"secret1","full_name":"Fresh Face","user_type":"patient"}),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = get(&c, format!("{}/nav?path=/nowhere", base)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "unknown_route");
    Ok(())
}

#[tokio::test]
async fn concurrent_clients_each_get_their_own_persona() -> Result<()> {
    let base = start().await?;
    let roles = ["patient", "provider", "patient", "provider", "patient"];
    let runs = roles.iter().map(|role| {
        let base = base.clone();
        async move {
            let c = browser()?;
            post(&c, format!("{}/auth/demo", base), json!({"role": role})).await?;
            let (_, body) = get(&c, format!("{}/auth/state", base)).await?;
            Ok::<_, anyhow::Error>((role.to_string(), body))
        }
    });
    for outcome in futures::future::join_all(runs).await {
        let (role, body) = outcome?;
        assert_eq!(body["status"], json!({"state":"demo_active","role": role}));
    }
    Ok(())
}

#[tokio::test]
async fn foreign_return_paths_fall_back_to_the_role_home() -> Result<()> {
    let base = start().await?;
    let c = browser()?;
    let (status, body) = post(
        &c,
        format!("{}/auth/sign-in", base),
        json!({"email":"dr.williams@example.com","password":"password","return_to":"https://evil.example/steal"}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["effects"][0]["effect"], "navigate");
    assert_eq!(body["effects"][0]["path"], "/provider");
    Ok(())
}

#[tokio::test]
async fn provider_writes_and_revises_a_prescription() -> Result<()> {
    let base = start().await?;
    let doctor = browser()?;
    let patient = browser()?;
    post(&doctor, format!("{}/auth/sign-in", base), json!({"email":"dr.johnson@example.com","password":"password"}))
        .await?;
    post(&patient, format!("{}/auth/sign-in", base), json!({"email":"jane@example.com","password":"password"})).await?;

    let (status, body) = post(
        &doctor,
        format!("{}/api/prescriptions", base),
        json!({"patient_id":"p1","medication":"Amoxicillin","frequency":"Twice daily","start_date":"2025-04-15"}),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_fields");

    let (status, body) = post(
        &doctor,
        format!("{}/api/prescriptions", base),
        json!({"patient_id":"p1","medication":"Amoxicillin","dosage":"500mg","frequency":"Twice daily","start_date":"2025-04-15"}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prescription"]["status"], "active");
    assert_eq!(body["prescription"]["provider_id"], "d1");
    assert_eq!(body["effects"][0]["message"], "Prescription created successfully");
    let id = body["prescription"]["id"].as_str().map(str::to_string).unwrap_or_default();

    let res = doctor
        .patch(format!("{}/api/prescriptions/{}", base, id))
        .json(&json!({"patient_id":"p1","medication":"Amoxicillin","dosage":"250mg","frequency":"Twice daily","start_date":"2025-04-15"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["prescription"]["dosage"], "250mg");
    assert_eq!(body["effects"][0]["message"], "Prescription updated successfully");

    let (status, body) = post(
        &doctor,
        format!("{}/api/prescriptions", base),
        json!({"patient_id":"p9","medication":"X","dosage":"1","frequency":"daily","start_date":"2025-04-15"}),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "unknown_patient");

    // Patients read their own prescriptions but cannot write any.
    let (status, body) = get(&patient, format!("{}/api/prescriptions", base)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prescriptions"][0]["dosage"], "250mg");
    let (status, _) = post(
        &patient,
        format!("{}/api/prescriptions", base),
        json!({"patient_id":"p1","medication":"X","dosage":"1","frequency":"daily","start_date":"2025-04-15"}),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
