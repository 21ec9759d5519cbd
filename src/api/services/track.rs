//! Visitor-facing endpoints: batch submission, consent, per-page hook.
//!
//! Tracking never breaks the visitor's page: apart from anti-forgery and
//! malformed-payload rejections, failures are logged and acknowledged.

use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use tracing::{debug, error, trace, warn};

use crate::api::constants::{CONSENT_RECORDED, TRACK_PREFIX};
use crate::api::types::{
    ApiResponse, HitsForm, PageViewRequest, PageViewResponse, SiteSettings, status_for,
    visitor_error,
};
use crate::services::consent::ConsentGate;
use crate::services::reconciler::{BatchOrigin, StagingReconciler};
use crate::services::session::{AntiForgery, SESSION_COOKIE, SessionStore, VisitorSession};
use crate::services::tracking::{PageView, VisitorTracker};
use crate::structs::ActivityHit;
use crate::utils::ip::{resolve_header_ip, resolve_visitor_ip};

fn session_cookie(id: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .finish()
}

fn session_id(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE).map(|c| c.value().to_string())
}

async fn current_session(
    req: &HttpRequest,
    sessions: &SessionStore,
) -> (VisitorSession, bool) {
    sessions.resume_or_start(session_id(req).as_deref()).await
}

/// POST /track/hits
pub async fn post_hits(
    req: HttpRequest,
    form: web::Form<HitsForm>,
    anti_forgery: web::Data<AntiForgery>,
    reconciler: web::Data<StagingReconciler>,
) -> HttpResponse {
    let session = session_id(&req);
    if let Err(e) = anti_forgery.verify(form.security.as_deref(), session.as_deref()) {
        warn!("Rejected activity batch: {}", e);
        return visitor_error(StatusCode::FORBIDDEN, &e.message());
    }

    let raw = form.hits.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return visitor_error(StatusCode::BAD_REQUEST, "No hits data received");
    }
    let hits: Vec<ActivityHit> = match serde_json::from_str(raw) {
        Ok(hits) => hits,
        Err(e) => {
            debug!("Malformed hits payload: {}", e);
            return visitor_error(StatusCode::BAD_REQUEST, "Malformed hits payload");
        }
    };

    let visitor_ip = resolve_visitor_ip(&req);
    let header_ip = resolve_header_ip(req.headers());
    let origin = BatchOrigin {
        account_id: form.account_id.as_deref().map(str::trim).unwrap_or_default(),
        visitor_ip: &visitor_ip,
        header_ip: &header_ip,
    };

    match reconciler.reconcile(&hits, origin).await {
        Ok(outcome) => {
            trace!("Batch from {} reconciled: {:?}", visitor_ip, outcome);
            HttpResponse::Ok().json(ApiResponse::<()>::ok(None))
        }
        Err(e) => visitor_error(status_for(&e), &e.message()),
    }
}

/// POST /track/consent
pub async fn post_consent(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    settings: web::Data<SiteSettings>,
) -> HttpResponse {
    let (session, created) = current_session(&req, &sessions).await;

    match sessions.grant_consent(&session.id).await {
        Ok(granted) => {
            debug!("Visitor session {} granted consent", granted.id);
            let mut response = HttpResponse::Ok();
            if created {
                response.cookie(session_cookie(&granted.id, settings.cookie_secure));
            }
            response.json(ApiResponse::ok(Some(CONSENT_RECORDED)))
        }
        Err(e) => {
            error!("Failed to record consent: {}", e);
            visitor_error(StatusCode::INTERNAL_SERVER_ERROR, &e.message())
        }
    }
}

/// POST /track/page-view
///
/// Runs the consent gate, fires the real-time trigger when tracking is
/// permitted and tells the host which scripts to deliver.
pub async fn post_page_view(
    req: HttpRequest,
    body: web::Json<PageViewRequest>,
    sessions: web::Data<SessionStore>,
    anti_forgery: web::Data<AntiForgery>,
    consent: web::Data<ConsentGate>,
    tracker: web::Data<VisitorTracker>,
    settings: web::Data<SiteSettings>,
) -> HttpResponse {
    if settings.is_excluded(&body.path) {
        trace!("Path {} is excluded from tracking", body.path);
        return HttpResponse::Ok().json(PageViewResponse {
            tracking: false,
            consent_prompt: false,
            security: None,
        });
    }

    let (session, created) = current_session(&req, &sessions).await;
    let customer_name = settings.customer_name(req.connection_info().host());
    let decision = consent.decide(&customer_name, &session).await;

    if decision.tracking_permitted {
        let view = PageView {
            customer_name,
            visitor_ip: resolve_visitor_ip(&req),
            header_ip: resolve_header_ip(req.headers()),
            page_title: body.page_title.clone(),
        };
        let outcome = tracker.track_page_view(&view).await;
        debug!("Page view '{}' tracked: {:?}", view.page_title, outcome);
    }

    let security = match anti_forgery.issue(&session.id) {
        Ok(token) => Some(token),
        Err(e) => {
            error!("Failed to issue anti-forgery token: {}", e);
            None
        }
    };

    let mut response = HttpResponse::Ok();
    if created {
        response.cookie(session_cookie(&session.id, settings.cookie_secure));
    }
    response.json(PageViewResponse {
        tracking: decision.tracking_permitted,
        consent_prompt: decision.consent_prompt,
        security,
    })
}

/// 访客跟踪路由 `/track`
pub fn track_routes() -> actix_web::Scope {
    web::scope(TRACK_PREFIX)
        .route("/hits", web::post().to(post_hits))
        .route("/consent", web::post().to(post_consent))
        .route("/page-view", web::post().to(post_page_view))
}
