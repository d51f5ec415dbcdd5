//! Sessões do lado do servidor e contexto por requisição
//!
//! O cookie carrega apenas `<uuid>.<hmac-sha256 em hex>`; os dados da sessão
//! (identidade autenticada, mensagens flash e tokens de redefinição) ficam no
//! `SessionStore` em memória. Cada handler recebe um [`RequestContext`]
//! explícito e devolve a resposta por [`RequestContext::commit`], que grava a
//! sessão e emite o cookie.
//!
//! Sessões expiram por inatividade. Sessões anônimas (só mensagens flash ou
//! tokens de redefinição) usam um prazo mais curto que as autenticadas. As
//! expiradas são descartadas na leitura e varridas durante as gravações.

use crate::error::Role;
use crate::log::SESSION;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderValue,
    },
    response::{IntoResponse, Response},
};
use hmac::{digest::InvalidLength, Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Inatividade máxima de uma sessão autenticada (duas semanas)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);
/// Inatividade máxima de uma sessão sem login
pub const DEFAULT_ANONYMOUS_TTL: Duration = Duration::from_secs(10 * 60);
/// Intervalo máximo entre varreduras de sessões expiradas
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Usuário autenticado na sessão
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "user_type", rename_all = "lowercase")]
pub enum Identity {
    Doctor { id: i64, name: String },
    Patient { id: i64, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Mensagem exibida uma única vez na próxima página
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub identity: Option<Identity>,
    pub flashes: Vec<Flash>,
    /// (perfil, email) -> token de redefinição de senha
    pub reset_tokens: HashMap<(Role, String), String>,
}

impl SessionData {
    fn is_empty(&self) -> bool {
        self.identity.is_none() && self.flashes.is_empty() && self.reset_tokens.is_empty()
    }
}

struct StoredSession {
    data: SessionData,
    last_seen: Instant,
}

struct Sessions {
    entries: HashMap<Uuid, StoredSession>,
    last_sweep: Instant,
}

/// Armazenamento de sessões em memória com cookies assinados
pub struct SessionStore {
    sessions: RwLock<Sessions>,
    mac: HmacSha256,
    cookie_name: String,
    secure_cookie: bool,
    ttl: Duration,
    anonymous_ttl: Duration,
}

impl SessionStore {
    pub fn new(
        secret: &[u8],
        cookie_name: impl Into<String>,
        secure_cookie: bool,
    ) -> Result<Self, InvalidLength> {
        Ok(Self {
            sessions: RwLock::new(Sessions {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            mac: <HmacSha256 as Mac>::new_from_slice(secret)?,
            cookie_name: cookie_name.into(),
            secure_cookie,
            ttl: DEFAULT_SESSION_TTL,
            anonymous_ttl: DEFAULT_ANONYMOUS_TTL,
        })
    }

    /// Define os prazos de inatividade para sessões autenticadas e anônimas
    pub fn with_expiry(mut self, ttl: Duration, anonymous_ttl: Duration) -> Self {
        self.ttl = ttl;
        self.anonymous_ttl = anonymous_ttl;
        self
    }

    fn is_expired(&self, session: &StoredSession, now: Instant) -> bool {
        let ttl = if session.data.identity.is_some() {
            self.ttl
        } else {
            self.anonymous_ttl
        };
        now.saturating_duration_since(session.last_seen) >= ttl
    }

    fn sweep_interval(&self) -> Duration {
        self.anonymous_ttl.min(MAX_SWEEP_INTERVAL)
    }

    fn sweep(&self, sessions: &mut Sessions, now: Instant) -> usize {
        let before = sessions.entries.len();
        sessions
            .entries
            .retain(|_, session| !self.is_expired(session, now));
        sessions.last_sweep = now;
        before - sessions.entries.len()
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Valor assinado do cookie para um id de sessão
    pub fn sign(&self, id: &Uuid) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        let tag = mac.finalize().into_bytes();
        format!("{}.{}", id, hex::encode(tag))
    }

    /// Extrai o id de sessão de um valor de cookie, conferindo a assinatura
    pub fn verify(&self, value: &str) -> Option<Uuid> {
        let (id, tag) = value.split_once('.')?;
        let id = Uuid::parse_str(id).ok()?;
        let tag = hex::decode(tag).ok()?;

        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        match mac.verify_slice(&tag) {
            Ok(()) => Some(id),
            Err(_) => {
                warn!(target: SESSION, "Cookie de sessão com assinatura inválida");
                None
            }
        }
    }

    /// Dados de uma sessão ainda válida; sessões expiradas contam como ausentes
    pub async fn load(&self, id: &Uuid) -> Option<SessionData> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        if self.is_expired(sessions.entries.get(id)?, now) {
            sessions.entries.remove(id);
            debug!(target: SESSION, session = %id, "Sessão expirada");
            return None;
        }

        let session = sessions.entries.get_mut(id)?;
        session.last_seen = now;
        Some(session.data.clone())
    }

    pub async fn save(&self, id: Uuid, data: SessionData) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        if now.saturating_duration_since(sessions.last_sweep) >= self.sweep_interval() {
            let removed = self.sweep(&mut sessions, now);
            if removed > 0 {
                debug!(target: SESSION, removed, "Sessões expiradas removidas");
            }
        }

        sessions.entries.insert(
            id,
            StoredSession {
                data,
                last_seen: now,
            },
        );
    }

    /// Remove as sessões expiradas e devolve quantas foram removidas
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.sweep(&mut sessions, Instant::now())
    }

    pub async fn remove(&self, id: &Uuid) {
        self.sessions.write().await.entries.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.entries.len()
    }

    fn set_cookie(&self, id: &Uuid) -> Option<HeaderValue> {
        let secure = if self.secure_cookie { "; Secure" } else { "" };
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
            self.cookie_name,
            self.sign(id),
            secure
        );
        HeaderValue::from_str(&cookie).ok()
    }

    fn expired_cookie(&self) -> Option<HeaderValue> {
        let cookie = format!("{}=; Path=/; HttpOnly; Max-Age=0", self.cookie_name);
        HeaderValue::from_str(&cookie).ok()
    }

    fn cookie_value<'a>(&self, parts: &'a Parts) -> Option<&'a str> {
        parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value)
    }
}

/// Contexto explícito de uma requisição: identidade, mensagens e tokens
#[derive(Debug, Clone)]
pub struct RequestContext {
    session_id: Option<Uuid>,
    data: SessionData,
    /// Sessão anterior a descartar no commit (login/logout rotacionam o id)
    discarded: Option<Uuid>,
}

impl RequestContext {
    /// Contexto anônimo, sem sessão
    pub fn anonymous() -> Self {
        Self {
            session_id: None,
            data: SessionData::default(),
            discarded: None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.data.identity.as_ref()
    }

    pub fn doctor_id(&self) -> Option<i64> {
        match self.data.identity {
            Some(Identity::Doctor { id, .. }) => Some(id),
            _ => None,
        }
    }

    pub fn patient_id(&self) -> Option<i64> {
        match self.data.identity {
            Some(Identity::Patient { id, .. }) => Some(id),
            _ => None,
        }
    }

    pub fn is_doctor(&self) -> bool {
        self.doctor_id().is_some()
    }

    /// Autentica a sessão com um novo id
    pub fn login(&mut self, identity: Identity) {
        self.rotate();
        self.data.identity = Some(identity);
    }

    /// Atualiza o nome exibido sem trocar a identidade
    pub fn rename(&mut self, name: &str) {
        match &mut self.data.identity {
            Some(Identity::Doctor { name: current, .. })
            | Some(Identity::Patient { name: current, .. }) => *current = name.to_string(),
            None => {}
        }
    }

    /// Descarta todos os dados da sessão
    pub fn flush(&mut self) {
        self.rotate();
        self.data = SessionData::default();
    }

    fn rotate(&mut self) {
        if let Some(old) = self.session_id.take() {
            self.discarded = Some(old);
        }
    }

    pub fn flash(&mut self, level: FlashLevel, message: impl Into<String>) {
        self.data.flashes.push(Flash {
            level,
            message: message.into(),
        });
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.flash(FlashLevel::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.flash(FlashLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.flash(FlashLevel::Error, message);
    }

    /// Consome as mensagens pendentes
    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.data.flashes)
    }

    /// Tokens valem apenas para o perfil que os pediu
    pub fn store_reset_token(&mut self, role: Role, email: &str, token: String) {
        self.data.reset_tokens.insert((role, email.to_string()), token);
    }

    pub fn reset_token_for(&self, role: Role, email: &str) -> Option<&str> {
        self.data
            .reset_tokens
            .get(&(role, email.to_string()))
            .map(String::as_str)
    }

    pub fn clear_reset_token(&mut self, role: Role, email: &str) {
        self.data.reset_tokens.remove(&(role, email.to_string()));
    }

    /// Grava a sessão e anexa o cookie à resposta
    pub async fn commit(self, store: &SessionStore, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();

        if let Some(old) = self.discarded {
            store.remove(&old).await;
            debug!(target: SESSION, session = %old, "Sessão descartada");
        }

        let cookie = match self.session_id {
            Some(id) if self.data.is_empty() => {
                store.remove(&id).await;
                store.expired_cookie()
            }
            Some(id) => {
                store.save(id, self.data).await;
                None
            }
            None if self.data.is_empty() => self.discarded.and_then(|_| store.expired_cookie()),
            None => {
                let id = Uuid::new_v4();
                store.save(id, self.data).await;
                store.set_cookie(&id)
            }
        };

        if let Some(cookie) = cookie {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let store = &state.sessions;

        let Some(id) = store.cookie_value(parts).and_then(|value| store.verify(value)) else {
            return Ok(RequestContext::anonymous());
        };

        Ok(match store.load(&id).await {
            Some(data) => RequestContext {
                session_id: Some(id),
                data,
                discarded: None,
            },
            None => RequestContext::anonymous(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(b"chave-de-teste", "sessionid", false).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let store = store();
        let id = Uuid::new_v4();
        let signed = store.sign(&id);

        assert_eq!(store.verify(&signed), Some(id));

        let other = SessionStore::new(b"outra-chave", "sessionid", false).unwrap();
        assert_eq!(other.verify(&signed), None);

        let forged = format!("{}.{}", Uuid::new_v4(), signed.split_once('.').unwrap().1);
        assert_eq!(store.verify(&forged), None);
        assert_eq!(store.verify("lixo"), None);
        assert_eq!(store.verify(&format!("{id}.zz")), None);
    }

    #[test]
    fn test_signature_is_hex_encoded_hmac() {
        let store = store();
        let id = Uuid::new_v4();
        let signed = store.sign(&id);
        let (_, tag) = signed.split_once('.').unwrap();

        // HMAC-SHA256 tem 32 bytes
        assert_eq!(hex::decode(tag).unwrap().len(), 32);
        assert_eq!(store.verify(&format!("{id}.{}", tag.to_uppercase())), Some(id));

        let truncated = &signed[..signed.len() - 1];
        assert_eq!(store.verify(truncated), None);
    }

    #[test]
    fn test_reset_tokens_are_scoped_by_role() {
        let mut ctx = RequestContext::anonymous();
        ctx.store_reset_token(Role::Patient, "a@example.com", "tok".to_string());

        assert_eq!(ctx.reset_token_for(Role::Patient, "a@example.com"), Some("tok"));
        assert_eq!(ctx.reset_token_for(Role::Doctor, "a@example.com"), None);

        ctx.clear_reset_token(Role::Doctor, "a@example.com");
        assert_eq!(ctx.reset_token_for(Role::Patient, "a@example.com"), Some("tok"));
        ctx.clear_reset_token(Role::Patient, "a@example.com");
        assert!(ctx.reset_token_for(Role::Patient, "a@example.com").is_none());
    }

    #[tokio::test]
    async fn test_anonymous_sessions_expire_before_authenticated_ones() {
        let store = store().with_expiry(Duration::from_secs(3600), Duration::ZERO);

        let authenticated = Uuid::new_v4();
        let data = SessionData {
            identity: Some(Identity::Patient {
                id: 1,
                name: "Maria".to_string(),
            }),
            ..SessionData::default()
        };
        store.save(authenticated, data).await;

        let anonymous = Uuid::new_v4();
        let mut data = SessionData::default();
        data.flashes.push(Flash {
            level: FlashLevel::Error,
            message: "Invalid email or password.".to_string(),
        });
        store.save(anonymous, data).await;
        assert_eq!(store.len().await, 2);

        assert!(store.load(&anonymous).await.is_none());
        assert!(store.load(&authenticated).await.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_saving_sweeps_expired_anonymous_sessions() {
        let store = store().with_expiry(Duration::from_secs(3600), Duration::ZERO);
        for _ in 0..50 {
            let mut ctx = RequestContext::anonymous();
            ctx.error("Invalid email or password.");
            ctx.commit(&store, "ok").await;
        }
        // Cada gravação varre as anônimas anteriores, já expiradas
        assert_eq!(store.len().await, 1);

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_sessions_survive_within_ttl() {
        let store = store();
        for _ in 0..5 {
            let mut ctx = RequestContext::anonymous();
            ctx.error("Invalid email or password.");
            ctx.commit(&store, "ok").await;
        }
        assert_eq!(store.purge_expired().await, 0);
        assert_eq!(store.len().await, 5);
    }

    #[test]
    fn test_context_identity_helpers() {
        let mut ctx = RequestContext::anonymous();
        assert!(ctx.identity().is_none());

        ctx.login(Identity::Doctor {
            id: 3,
            name: "House".to_string(),
        });
        assert_eq!(ctx.doctor_id(), Some(3));
        assert_eq!(ctx.patient_id(), None);
        assert!(ctx.is_doctor());

        ctx.rename("Gregory House");
        assert_eq!(
            ctx.identity(),
            Some(&Identity::Doctor {
                id: 3,
                name: "Gregory House".to_string()
            })
        );

        ctx.success("ok");
        ctx.flush();
        assert!(ctx.identity().is_none());
        assert!(ctx.take_flashes().is_empty());
    }

    #[tokio::test]
    async fn test_commit_creates_and_clears_sessions() {
        let store = store();

        let mut ctx = RequestContext::anonymous();
        ctx.success("Bem-vindo");
        let response = ctx.commit(&store, "ok").await;
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("sessionid="));
        assert!(cookie.contains("HttpOnly"));
        assert_eq!(store.len().await, 1);

        // Requisição anônima sem dados não cria sessão
        let response = RequestContext::anonymous().commit(&store, "ok").await;
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(store.len().await, 1);
    }
}
