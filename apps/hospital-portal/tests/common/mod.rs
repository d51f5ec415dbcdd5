#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Method, Request, StatusCode,
    },
    Router,
};
use hospital_db::repository::{doctors, patients};
use hospital_db::test_utils::memory_pool;
use hospital_portal::{app, config::AppConfig, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

pub const PASSWORD: &str = "segredo123";

/// Aplicação completa sobre um banco em memória
pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let pool = memory_pool().await?;
        let state = AppState::new(pool.clone(), &AppConfig::default())?;
        Ok(Self {
            router: app(state),
            pool,
        })
    }

    /// Cliente sem sessão
    pub fn client(&self) -> Client {
        Client {
            router: self.router.clone(),
            cookie: None,
        }
    }

    pub async fn register_doctor(&self, email: &str) -> Result<i64> {
        let response = self
            .client()
            .post_form(
                "/doctor/register/",
                &format!(
                    "name=Gregory+House&email={email}&password={PASSWORD}&confirm_password={PASSWORD}\
                     &specialization=General+Medicine&experience=12"
                ),
            )
            .await?;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{}", response.text());

        let doctor = doctors::find_by_email(&self.pool, email)
            .await?
            .context("médico não cadastrado")?;
        Ok(doctor.id)
    }

    pub async fn register_patient(&self, email: &str) -> Result<i64> {
        let response = self
            .client()
            .post_form(
                "/patient/register/",
                &format!(
                    "name=Maria+Silva&email={email}&password={PASSWORD}&confirm_password={PASSWORD}\
                     &phone=11987654321"
                ),
            )
            .await?;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{}", response.text());

        let patient = patients::find_by_email(&self.pool, email)
            .await?
            .context("paciente não cadastrado")?;
        Ok(patient.id)
    }

    /// Cliente autenticado como médico (`role = "doctor"`) ou paciente
    pub async fn login(&self, role: &str, email: &str, password: &str) -> Result<Client> {
        let mut client = self.client();
        let response = client
            .post_form(
                &format!("/{role}/login/"),
                &format!("email={email}&password={password}"),
            )
            .await?;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(
            response.location.as_deref(),
            Some(format!("/{role}/dashboard/").as_str()),
            "login de {email} falhou"
        );
        Ok(client)
    }
}

/// Resposta já lida por completo
pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).context("corpo não é JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Cliente HTTP que guarda o cookie de sessão entre requisições
pub struct Client {
    router: Router,
    cookie: Option<String>,
}

impl Client {
    pub async fn get(&mut self, uri: &str) -> Result<TestResponse> {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post_form(&mut self, uri: &str, body: &str) -> Result<TestResponse> {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn send(&mut self, method: Method, uri: &str, form: Option<&str>) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body)?).await?;

        if let Some(set_cookie) = response.headers().get(SET_COOKIE) {
            let pair = set_cookie.to_str()?.split(';').next().unwrap_or_default();
            self.cookie = match pair.split_once('=') {
                Some((_, value)) if !value.is_empty() => Some(pair.to_string()),
                _ => None,
            };
        }

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = hyper::body::to_bytes(response.into_body()).await?.to_vec();

        Ok(TestResponse {
            status,
            location,
            body,
        })
    }
}

/// Textos das mensagens flash de uma página JSON
pub fn messages(page: &Value) -> Vec<String> {
    page["messages"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["message"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
