use super::retry_session::RetrySession;
use super::urls;
use crate::config::{ResolvedSource, SourceKind};
use crate::fetch::model::{FetchError, FetchRequest};
use log::info;
use serde_json::Value;
use std::sync::atomic::AtomicBool;

/// 花名册 API 会话
///
/// 在 RetrySession 之上按端点组织请求，负责把逻辑请求翻译成
/// 当前数据源下的完整 URL，并附带数据源要求的认证头。
pub struct RosterSession {
    session: RetrySession,
    source: ResolvedSource,
}

impl RosterSession {
    pub fn new(source: ResolvedSource) -> Self {
        Self::with_session(source, RetrySession::new())
    }

    /// 注入自定义重试参数的会话
    pub fn with_session(source: ResolvedSource, session: RetrySession) -> Self {
        Self { session, source }
    }

    pub fn source(&self) -> &ResolvedSource {
        &self.source
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind
    }

    /// 花名册首页 URL
    pub fn roster_url(&self) -> String {
        urls::url_roster(&self.source)
    }

    /// 逻辑请求在当前数据源下的完整 URL
    pub fn url_for(&self, request: &FetchRequest) -> String {
        match request {
            FetchRequest::RosterPage { url } => url.clone(),
            FetchRequest::MemberDetail { id } => urls::url_roster_member(&self.source, *id),
            FetchRequest::SearchMember { name } => urls::url_roster_search(&self.source, name),
            FetchRequest::SearchDivision { name } => {
                urls::url_divisions_search(&self.source, name)
            }
        }
    }

    /// 执行逻辑请求并返回 JSON 报文
    pub async fn dispatch(
        &self,
        request: &FetchRequest,
        url: &str,
        cancel: &AtomicBool,
    ) -> Result<Value, FetchError> {
        let body = self.session.get_json(url, &self.source.headers, cancel).await?;
        info!("{} {}(...) [{}]", self, request.op_name(), url);
        Ok(body)
    }
}

impl std::fmt::Display for RosterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<RosterSession [{}]>", self.source.kind.as_str())
    }
}

impl std::fmt::Debug for RosterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<RosterSession [{}]>", self.source.kind.as_str())
    }
}
