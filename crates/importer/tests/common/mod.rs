#![allow(dead_code)]

pub mod pg;

use anyhow::Context as _;
use std::process::{Child, Command};
use std::time::Duration;

pub use unrelated_test_support::{KillOnDrop, SseReader};

pub const PETSTORE_YAML: &str = r"
openapi: 3.0.3
info:
  title: Swagger Petstore
  version: 1.0.0
servers:
  - url: https://petstore.example.com/v1
paths:
  /pets:
    get:
      operationId: listPets
      summary: List all pets
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
      responses:
        '200':
          description: A list of pets
    post:
      operationId: createPet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name:
                  type: string
                tag:
                  type: string
      responses:
        '201':
          description: Created
  /pets/{petId}:
    get:
      operationId: showPetById
      parameters:
        - name: petId
          in: path
          required: true
          schema:
            type: string
      responses:
        '200':
          description: One pet
";

pub fn pick_unused_port() -> anyhow::Result<u16> {
    unrelated_test_support::pick_unused_port()
}

pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    unrelated_test_support::wait_http_ok(url, timeout_dur).await
}

pub fn spawn_importer(port: u16, extra_args: &[&str]) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_unrelated-openapi-import");
    Command::new(bin)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--log-level")
        .arg("info")
        .args(extra_args)
        .spawn()
        .context("spawn importer")
}

/// Start an in-memory importer and wait for `/health`. Returns the guard and base URL.
pub async fn start_importer(extra_args: &[&str]) -> anyhow::Result<(KillOnDrop, String)> {
    let port = pick_unused_port()?;
    let child = KillOnDrop(spawn_importer(port, extra_args)?);
    let base = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base}/health"), Duration::from_secs(30)).await?;
    Ok((child, base))
}

pub fn import_form(
    spec: &[u8],
    tenant: Option<&str>,
    prefix: Option<&str>,
) -> reqwest::multipart::Form {
    let mut form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(spec.to_vec()).file_name("openapi.yaml"),
    );
    if let Some(tenant) = tenant {
        form = form.text("tenantId", tenant.to_string());
    }
    if let Some(prefix) = prefix {
        form = form.text("prefix", prefix.to_string());
    }
    form
}

pub async fn post_import(
    client: &reqwest::Client,
    base: &str,
    form: reqwest::multipart::Form,
) -> anyhow::Result<(reqwest::StatusCode, serde_json::Value)> {
    let resp = client
        .post(format!("{base}/api/openapi/import"))
        .multipart(form)
        .send()
        .await
        .context("POST /api/openapi/import")?;
    let status = resp.status();
    let body = resp.json().await.context("import response JSON")?;
    Ok((status, body))
}
