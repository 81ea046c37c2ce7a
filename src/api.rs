use rocket::State;
use rocket::http::{ContentType, Header, Status};
use rocket::response::content::RawHtml;
use rocket::response::status::{Created, Custom, NoContent};
use rocket::response::stream::{Event, EventStream};
use rocket::response::{self, Responder, Response};
use rocket::serde::{Deserialize, Serialize, json::Json};
use rocket::{Request, Shutdown, tokio::select};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::ClassroomConfig;
use crate::diff;
use crate::export;
use crate::models::{
    ArtifactFields, ArtifactKind, AttendanceRecord, ClassSession, CodeArtifact, FileKind,
    NewArtifact, SessionSummary, StudentAttendance,
};
use crate::playground::{PlaygroundHub, PlaygroundState};
use crate::roster::{LiveRoster, RankedEntry, RosterView, ranked};
use crate::sandbox::{ConsoleMessage, SANDBOX_POLICY, document};
use crate::sessions;
use crate::store::{ArtifactFilter, SharedStore};
use crate::validation::{
    ApiError, AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationResponse,
};
use crate::versions::{VersionComparison, VersionHistory, VersionLedger};

/// HTML rendered inside the sandbox. The CSP header applies the same
/// restrictions as the embedded frame's `sandbox` attribute.
pub struct SandboxedHtml(pub String);

impl<'r> Responder<'r, 'static> for SandboxedHtml {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        Response::build_from(RawHtml(self.0).respond_to(req)?)
            .header(Header::new(
                "Content-Security-Policy",
                format!("sandbox {}", SANDBOX_POLICY),
            ))
            .ok()
    }
}

pub struct CsvExport {
    pub file_name: String,
    pub body: String,
}

impl<'r> Responder<'r, 'static> for CsvExport {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        Response::build_from(self.body.respond_to(req)?)
            .header(ContentType::CSV)
            .header(Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.file_name),
            ))
            .ok()
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: ClassSession,
    pub check_in_url: String,
}

impl SessionResponse {
    fn new(session: ClassSession, config: &ClassroomConfig) -> Self {
        Self {
            check_in_url: config.check_in_url(&session.session_code),
            session,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(range(min = 1, message = "Week number must be at least 1"))]
    week_number: i64,
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
}

#[get("/sessions")]
pub async fn api_list_sessions(
    store: &State<SharedStore>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let sessions = sessions::list_sessions(store.inner().as_ref()).await.validate_custom()?;
    Ok(Json(sessions))
}

#[get("/sessions/active")]
pub async fn api_active_session(
    store: &State<SharedStore>,
    config: &State<ClassroomConfig>,
) -> Result<Json<Option<SessionResponse>>, ApiError> {
    let session = sessions::active_session(store.inner().as_ref())
        .await
        .validate_custom()?;
    Ok(Json(session.map(|s| SessionResponse::new(s, config))))
}

#[post("/sessions", data = "<request>")]
pub async fn api_start_session(
    request: Json<StartSessionRequest>,
    store: &State<SharedStore>,
    config: &State<ClassroomConfig>,
) -> Result<Created<Json<SessionResponse>>, ApiError> {
    let validated = request.validate_custom()?;

    let session = sessions::start_session(store.inner().as_ref(), validated.week_number, &validated.title)
        .await
        .validate_custom()?;

    let location = format!("/api/sessions/{}", session.id);
    Ok(Created::new(location).body(Json(SessionResponse::new(session, config))))
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: i64,
    store: &State<SharedStore>,
    config: &State<ClassroomConfig>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = store.get_session(id).await.validate_custom()?;
    Ok(Json(SessionResponse::new(session, config)))
}

#[post("/sessions/<id>/end")]
pub async fn api_end_session(
    id: i64,
    store: &State<SharedStore>,
    config: &State<ClassroomConfig>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = sessions::end_session(store.inner().as_ref(), id)
        .await
        .validate_custom()?;
    Ok(Json(SessionResponse::new(session, config)))
}

/// QR image of the session's check-in link for the classroom display.
#[get("/sessions/<id>/qr")]
pub async fn api_session_qr(
    id: i64,
    store: &State<SharedStore>,
    config: &State<ClassroomConfig>,
) -> Result<(ContentType, String), ApiError> {
    let session = store.get_session(id).await.validate_custom()?;
    let svg = sessions::check_in_qr_svg(&config.check_in_url(&session.session_code))
        .validate_custom()?;
    Ok((ContentType::SVG, svg))
}

#[delete("/sessions/<id>")]
pub async fn api_delete_session(id: i64, store: &State<SharedStore>) -> Result<NoContent, ApiError> {
    sessions::delete_session(store.inner().as_ref(), id)
        .await
        .validate_custom()?;
    Ok(NoContent)
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RosterResponse {
    pub session_id: i64,
    pub view: RosterView,
    pub records: Vec<RankedEntry>,
}

impl RosterResponse {
    fn of(roster: &LiveRoster) -> Self {
        Self {
            session_id: roster.session_id(),
            view: roster.view(),
            records: ranked(roster.records()),
        }
    }
}

#[get("/sessions/<id>/attendance?<view>")]
pub async fn api_session_attendance(
    id: i64,
    view: Option<RosterView>,
    store: &State<SharedStore>,
) -> Result<Json<RosterResponse>, ApiError> {
    let view = view.unwrap_or_default();
    store.get_session(id).await.validate_custom()?;
    let records = store.list_attendance(id, view).await.validate_custom()?;

    Ok(Json(RosterResponse {
        session_id: id,
        view,
        records: ranked(&records),
    }))
}

/// Server-sent events: the full roster once on connect, then again after every
/// change to the session's attendance.
#[get("/sessions/<id>/attendance/stream?<view>")]
pub async fn api_attendance_stream(
    id: i64,
    view: Option<RosterView>,
    store: &State<SharedStore>,
    mut shutdown: Shutdown,
) -> Result<EventStream![], ApiError> {
    store.get_session(id).await.validate_custom()?;
    let mut roster = LiveRoster::open(store.inner().clone(), id, view.unwrap_or_default())
        .await
        .validate_custom()?;

    Ok(EventStream! {
        yield Event::json(&RosterResponse::of(&roster)).event("roster");
        loop {
            let refresh = select! {
                refresh = roster.next_change() => refresh,
                _ = &mut shutdown => break,
            };
            match refresh {
                Ok(Some(_)) => yield Event::json(&RosterResponse::of(&roster)).event("roster"),
                Ok(None) => break,
                Err(err) => {
                    err.log_and_record("Attendance stream reload");
                    break;
                }
            }
        }
        roster.close();
    })
}

#[get("/sessions/<id>/export")]
pub async fn api_export_session(id: i64, store: &State<SharedStore>) -> Result<CsvExport, ApiError> {
    let session = store.get_session(id).await.validate_custom()?;
    let records = store
        .list_attendance(id, RosterView::Leaderboard)
        .await
        .validate_custom()?;

    Ok(CsvExport {
        file_name: export::session_file_name(session.week_number, &session.session_code),
        body: export::session_csv(&records),
    })
}

#[get("/attendance/export")]
pub async fn api_export_all(store: &State<SharedStore>) -> Result<CsvExport, ApiError> {
    let rows = store.list_all_attendance().await.validate_custom()?;
    Ok(CsvExport {
        file_name: "attendance-all-sessions.csv".to_string(),
        body: export::all_sessions_csv(&rows),
    })
}

#[get("/attendance/student?<email>")]
pub async fn api_student_attendance(
    email: &str,
    store: &State<SharedStore>,
) -> Result<Json<StudentAttendance>, ApiError> {
    let attendance = sessions::student_attendance(store.inner().as_ref(), email)
        .await
        .validate_custom()?;
    Ok(Json(attendance))
}

#[derive(Deserialize, Validate)]
pub struct PointsCorrection {
    #[validate(range(min = 0, message = "Points cannot be negative"))]
    points: i64,
}

#[put("/attendance/<id>/points", data = "<correction>")]
#[instrument(skip(correction, store))]
pub async fn api_correct_points(
    id: i64,
    correction: Json<PointsCorrection>,
    store: &State<SharedStore>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let validated = correction.validate_custom()?;
    let record = store
        .update_attendance_points(id, validated.points)
        .await
        .validate_custom()?;
    info!(points = record.points, "Attendance points corrected");
    Ok(Json(record))
}

#[post("/artifacts", data = "<artifact>")]
pub async fn api_create_artifact(
    artifact: Json<NewArtifact>,
    store: &State<SharedStore>,
) -> Result<Created<Json<CodeArtifact>>, ApiError> {
    let mut new = artifact.into_inner();
    new.title = new.title.trim().to_string();
    new.student_email = new
        .student_email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    if new.title.is_empty() {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error("title", "Title is required")),
        ));
    }
    if new.kind == ArtifactKind::StudentSave && new.student_email.is_none() {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "student_email",
                "Student saves need the student's email",
            )),
        ));
    }
    if let Some(source) = new.forked_from {
        store.get_artifact(source).await.validate_custom()?;
    }

    let created = store.create_artifact(new).await.validate_custom()?;
    let location = format!("/api/artifacts/{}", created.id);
    Ok(Created::new(location).body(Json(created)))
}

#[get("/artifacts?<kind>&<week>&<email>")]
pub async fn api_list_artifacts(
    kind: Option<ArtifactKind>,
    week: Option<i64>,
    email: Option<&str>,
    store: &State<SharedStore>,
) -> Result<Json<Vec<CodeArtifact>>, ApiError> {
    let filter = ArtifactFilter {
        kind,
        week_number: week,
        student_email: email.map(|e| e.trim().to_lowercase()),
    };
    let artifacts = store.list_artifacts(&filter).await.validate_custom()?;
    Ok(Json(artifacts))
}

#[get("/artifacts/<id>")]
pub async fn api_get_artifact(
    id: i64,
    store: &State<SharedStore>,
) -> Result<Json<CodeArtifact>, ApiError> {
    let artifact = store.get_artifact(id).await.validate_custom()?;
    Ok(Json(artifact))
}

#[derive(Deserialize)]
pub struct SaveArtifactRequest {
    #[serde(flatten)]
    fields: ArtifactFields,
    change_summary: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SaveArtifactResponse {
    pub artifact_id: i64,
    pub version_number: i64,
}

#[put("/artifacts/<id>", data = "<request>")]
pub async fn api_save_artifact(
    id: i64,
    request: Json<SaveArtifactRequest>,
    store: &State<SharedStore>,
) -> Result<Json<SaveArtifactResponse>, ApiError> {
    let SaveArtifactRequest {
        fields,
        change_summary,
    } = request.into_inner();

    let version_number = VersionLedger::new(store.inner().as_ref())
        .save_with_history(id, fields, change_summary)
        .await
        .validate_custom()?;

    Ok(Json(SaveArtifactResponse {
        artifact_id: id,
        version_number,
    }))
}

#[get("/artifacts/<id>/versions")]
pub async fn api_artifact_versions(
    id: i64,
    store: &State<SharedStore>,
) -> Result<Json<VersionHistory>, ApiError> {
    let history = VersionLedger::new(store.inner().as_ref())
        .history(id)
        .await
        .validate_custom()?;
    Ok(Json(history))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ComparisonResponse {
    #[serde(flatten)]
    pub comparison: VersionComparison,
    pub unified: Vec<String>,
}

#[get("/artifacts/<id>/compare?<file>&<from>&<to>")]
pub async fn api_compare_versions(
    id: i64,
    file: Option<FileKind>,
    from: Option<i64>,
    to: Option<i64>,
    store: &State<SharedStore>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    let comparison = VersionLedger::new(store.inner().as_ref())
        .compare(id, file.unwrap_or(FileKind::Markup), from, to)
        .await
        .validate_custom()?;

    Ok(Json(ComparisonResponse {
        unified: diff::unified(&comparison.lines),
        comparison,
    }))
}

#[post("/playgrounds?<artifact>", data = "<sources>")]
pub async fn api_create_playground(
    artifact: Option<i64>,
    sources: Option<Json<ArtifactFields>>,
    store: &State<SharedStore>,
    hub: &State<PlaygroundHub>,
) -> Result<Created<Json<PlaygroundState>>, ApiError> {
    let sources = match (artifact, sources) {
        (Some(id), _) => store.get_artifact(id).await.validate_custom()?.fields,
        (None, Some(sources)) => sources.into_inner(),
        (None, None) => ArtifactFields::default(),
    };

    let state = hub.create(sources).validate_custom()?;
    let location = format!("/api/playgrounds/{}", state.id);
    Ok(Created::new(location).body(Json(state)))
}

#[get("/playgrounds/<id>")]
pub fn api_get_playground(
    id: Uuid,
    hub: &State<PlaygroundHub>,
) -> Result<Json<PlaygroundState>, ApiError> {
    Ok(Json(hub.state(id).validate_custom()?))
}

#[derive(Deserialize, Default)]
pub struct SourcesUpdate {
    markup: Option<String>,
    style: Option<String>,
    script: Option<String>,
}

/// Replaces whichever files are present. One edit, so at most one auto-run.
#[put("/playgrounds/<id>/sources", data = "<update>")]
pub fn api_update_sources(
    id: Uuid,
    update: Json<SourcesUpdate>,
    hub: &State<PlaygroundHub>,
) -> Result<Json<PlaygroundState>, ApiError> {
    let update = update.into_inner();
    let (_, state) = hub
        .with_runner(id, |runner| {
            let mut sources = runner.sources().clone();
            if let Some(markup) = update.markup {
                sources.markup = markup;
            }
            if let Some(style) = update.style {
                sources.style = style;
            }
            if let Some(script) = update.script {
                sources.script = script;
            }
            runner.set_sources(sources);
        })
        .validate_custom()?;
    Ok(Json(state))
}

#[post("/playgrounds/<id>/run")]
pub fn api_run_playground(
    id: Uuid,
    hub: &State<PlaygroundHub>,
) -> Result<Json<PlaygroundState>, ApiError> {
    let (_, state) = hub.with_runner(id, |runner| runner.run()).validate_custom()?;
    Ok(Json(state))
}

#[derive(Deserialize)]
pub struct AutoRunRequest {
    enabled: bool,
}

#[put("/playgrounds/<id>/auto-run", data = "<request>")]
pub fn api_set_auto_run(
    id: Uuid,
    request: Json<AutoRunRequest>,
    hub: &State<PlaygroundHub>,
) -> Result<Json<PlaygroundState>, ApiError> {
    let (_, state) = hub
        .with_runner(id, |runner| runner.set_auto_run(request.enabled))
        .validate_custom()?;
    Ok(Json(state))
}

#[post("/playgrounds/<id>/pop-out")]
pub fn api_pop_out(id: Uuid, hub: &State<PlaygroundHub>) -> Result<Json<PlaygroundState>, ApiError> {
    let (_, state) = hub.with_runner(id, |runner| runner.pop_out()).validate_custom()?;
    Ok(Json(state))
}

#[post("/playgrounds/<id>/pop-in")]
pub fn api_pop_in(id: Uuid, hub: &State<PlaygroundHub>) -> Result<Json<PlaygroundState>, ApiError> {
    let (_, state) = hub.with_runner(id, |runner| runner.pop_in()).validate_custom()?;
    Ok(Json(state))
}

#[post("/playgrounds/<id>/window-closed")]
pub fn api_window_closed(
    id: Uuid,
    hub: &State<PlaygroundHub>,
) -> Result<Json<PlaygroundState>, ApiError> {
    let (_, state) = hub
        .with_runner(id, |runner| runner.window_closed())
        .validate_custom()?;
    Ok(Json(state))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RelayResponse {
    pub accepted: bool,
    pub message: Option<ConsoleMessage>,
}

/// Console events posted by the preview document. Anything that isn't a
/// console event is acknowledged and dropped.
#[post("/playgrounds/<id>/console", data = "<message>")]
pub fn api_relay_console(
    id: Uuid,
    message: Json<Value>,
    hub: &State<PlaygroundHub>,
) -> Result<Json<RelayResponse>, ApiError> {
    let message = hub.relay(id, &message).validate_custom()?;
    Ok(Json(RelayResponse {
        accepted: message.is_some(),
        message,
    }))
}

#[get("/playgrounds/<id>/console")]
pub fn api_read_console(
    id: Uuid,
    hub: &State<PlaygroundHub>,
) -> Result<Json<Vec<ConsoleMessage>>, ApiError> {
    Ok(Json(hub.state(id).validate_custom()?.console))
}

#[get("/playgrounds/<id>/preview")]
pub fn api_playground_preview(
    id: Uuid,
    hub: &State<PlaygroundHub>,
) -> Result<SandboxedHtml, ApiError> {
    Ok(SandboxedHtml(hub.document(id).validate_custom()?))
}

#[delete("/playgrounds/<id>")]
pub fn api_teardown_playground(id: Uuid, hub: &State<PlaygroundHub>) -> Result<NoContent, ApiError> {
    hub.teardown(id).validate_custom()?;
    Ok(NoContent)
}

/// Stateless build of a preview document.
#[post("/render", data = "<sources>")]
pub fn api_render(sources: Json<ArtifactFields>) -> SandboxedHtml {
    SandboxedHtml(document::build(&sources))
}

#[catch(default)]
pub fn api_default_catcher(status: Status, _req: &Request) -> Json<ValidationResponse> {
    status.to_validation_response().1
}
