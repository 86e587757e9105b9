//! Network and port pages.
//!
//! Every handler here follows the same shape: resolve the caller's service scope,
//! validate the posted form if any, call the network service, then redirect with a
//! flash message or render. Remote failures are logged and turned into messages at
//! this boundary and never surface as a bare error response.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::{Form, Router};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use super::{form_map, form_values, login_redirect, redirect, render_error, render_page, service_scope, validate_csrf, AppState};
use crate::api::{ComputeApi, NetworkApi, PortState, ServiceScope};
use crate::error::{ApiResult, AppError};
use crate::forms::{Field, FormErrors, FormSpec, Widget};
use crate::identity::RequestContext;
use crate::render;
use crate::tables::{Action, Column, TableRow, TableSpec};

pub const INDEX_URL: &str = "/nova/networks/";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/nova/networks/", get(index).post(index_action))
        .route("/nova/networks/create", get(create_page).post(create_submit))
        .route("/nova/networks/{network_id}/rename", get(rename_page).post(rename_submit))
        .route("/nova/networks/{network_id}/detail", get(detail).post(detail_action))
        .route("/nova/networks/{network_id}/ports/create", get(port_create_page).post(port_create_submit))
        .route("/nova/networks/{network_id}/ports/{port_id}/attach", get(port_attach_page).post(port_attach_submit))
}

fn detail_url(network_id: &str) -> String {
    format!("/nova/networks/{}/detail", network_id)
}

/// Port usage of one network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub total: usize,
    pub used: usize,
    pub available: usize,
}

/// Count the ports of `network_id`, split by whether anything is attached.
pub async fn calc_network_stats(api: &dyn NetworkApi, scope: &ServiceScope, network_id: &str) -> ApiResult<NetworkStats> {
    let mut stats = NetworkStats::default();
    for port in api.list_ports(scope, network_id).await? {
        stats.total += 1;
        if api.get_port_attachment(scope, network_id, &port.id).await?.is_attached() {
            stats.used += 1;
        } else {
            stats.available += 1;
        }
    }
    Ok(stats)
}

/// One line of the port table on the detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    pub id: String,
    pub state: String,
    /// Interface id the port is plugged into.
    pub attachment: Option<String>,
    /// Instance owning that interface, when compute knows it.
    pub instance: Option<String>,
}

pub async fn get_port_states(
    network: &dyn NetworkApi,
    compute: &dyn ComputeApi,
    net_scope: &ServiceScope,
    compute_scope: &ServiceScope,
    network_id: &str,
) -> ApiResult<Vec<PortStatus>> {
    let vifs = compute.list_vifs(compute_scope).await?;
    let mut out = Vec::new();
    for port in network.list_ports(net_scope, network_id).await? {
        let details = network.get_port_details(net_scope, network_id, &port.id).await?;
        let attachment = network.get_port_attachment(net_scope, network_id, &port.id).await?;
        let attachment = attachment.id.filter(|id| !id.is_empty());
        let instance = attachment.as_ref().and_then(|att| {
            vifs.iter().find(|v| &v.id == att).map(|v| {
                if v.instance_name.is_empty() { v.instance_id.clone() } else { v.instance_name.clone() }
            })
        });
        out.push(PortStatus { id: details.id, state: details.state, attachment, instance });
    }
    Ok(out)
}

/// A row of the networks table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkRow {
    pub id: String,
    pub name: String,
    pub stats: NetworkStats,
    pub tenant: String,
}

impl TableRow for NetworkRow {
    fn object_id(&self) -> String { self.id.clone() }
    fn object_display(&self) -> String { self.name.clone() }
    fn cell(&self, column: &str) -> String {
        match column {
            "id" => self.id.clone(),
            "name" => self.name.clone(),
            "used" => self.stats.used.to_string(),
            "available" => self.stats.available.to_string(),
            "total" => self.stats.total.to_string(),
            "tenant" => self.tenant.clone(),
            _ => String::new(),
        }
    }
}

pub async fn list_network_rows(api: &dyn NetworkApi, scope: &ServiceScope) -> ApiResult<Vec<NetworkRow>> {
    let mut rows = Vec::new();
    for net in api.list_networks(scope).await? {
        let stats = calc_network_stats(api, scope, &net.id).await?;
        let details = api.get_network_details(scope, &net.id).await?;
        rows.push(NetworkRow { id: net.id, name: details.name, stats, tenant: scope.tenant_id.clone() });
    }
    Ok(rows)
}

pub fn networks_table() -> TableSpec {
    TableSpec::new("networks", "Networks")
        .column(Column::new("id", "Id"))
        .column(Column::new("name", "Name"))
        .column(Column::new("used", "Used"))
        .column(Column::new("available", "Available"))
        .column(Column::new("total", "Total"))
        .row_action(Action::delete("Network", "Networks"))
        .row_action(Action::link("rename", "Rename Network", "/nova/networks/{id}/rename", "ajax-modal"))
        .table_action(Action::link("create_network", "Create New Network", "/nova/networks/create", "ajax-modal btn small"))
        .table_action(Action::delete("Network", "Networks"))
}

pub fn create_network_form() -> FormSpec {
    FormSpec::new("create_network", "Create Network", "Create Network").field(Field::char("name", "Network Name"))
}

pub fn rename_network_form() -> FormSpec {
    FormSpec::new("rename_network", "Rename Network", "Rename Network")
        .field(Field::char("network", "Network").widget(Widget::Hidden))
        .field(Field::char("new_name", "New Name"))
}

pub fn create_port_form() -> FormSpec {
    FormSpec::new("create_port", "Create Ports", "Create Ports")
        .field(Field::integer("ports_num", "Number of Ports").range(1, 1000))
        .field(Field::char("network", "Network").widget(Widget::Hidden))
}

pub fn attach_port_form(choices: Vec<(String, String)>) -> FormSpec {
    FormSpec::new("attach_port", "Attach Port", "Attach")
        .field(Field::choice("vif_id", "Select VIF to connect", choices))
        .field(Field::char("network", "Network").widget(Widget::Hidden))
        .field(Field::char("port", "Port").widget(Widget::Hidden))
}

fn port_form(name: &'static str) -> FormSpec {
    FormSpec::new(name, "", "")
        .field(Field::char("network", "Network").widget(Widget::Hidden))
        .field(Field::char("port", "Port").widget(Widget::Hidden))
}

pub fn delete_port_form() -> FormSpec { port_form("delete_port") }

pub fn detach_port_form() -> FormSpec { port_form("detach_port") }

pub fn toggle_port_form() -> FormSpec {
    let states = [PortState::Active, PortState::Down]
        .iter()
        .map(|s| (s.as_str().to_string(), s.as_str().to_string()))
        .collect();
    port_form("toggle_port").field(Field::choice("state", "State", states).widget(Widget::Hidden))
}

/// `None` for anonymous callers.
fn network_scope(state: &AppState, ctx: &RequestContext) -> Option<Result<ServiceScope, AppError>> {
    let user = ctx.user.as_ref()?;
    Some(service_scope(ctx, user, "network", state.settings.network_url.as_ref()))
}

fn compute_scope(state: &AppState, ctx: &RequestContext) -> Option<Result<ServiceScope, AppError>> {
    let user = ctx.user.as_ref()?;
    Some(service_scope(ctx, user, "compute", state.settings.compute_url.as_ref()))
}

/// Log a failed remote operation and queue `"<what>: <reason>"` for the next page.
fn flash_failure(ctx: &mut RequestContext, what: &str, err: &AppError) {
    error!(target: "networks", request_id = %ctx.request_id, code = err.code_str(), "{}: {}", what, err.message());
    ctx.session.messages.error(format!("{}: {}", what, err.message()));
}

fn csrf_error() -> AppError {
    AppError::csrf("csrf_failed", "CSRF verification failed. Request aborted.")
}

async fn render_form(
    state: &AppState,
    ctx: RequestContext,
    form: &FormSpec,
    values: &HashMap<String, String>,
    errors: Option<&FormErrors>,
    cancel_url: &str,
    description: Option<String>,
) -> Response {
    let extra = json!({
        "form": form.context(values, errors),
        "cancel_url": cancel_url,
        "description": description,
    });
    render_page(state, ctx, render::FORM_PAGE, form.title, StatusCode::OK, extra).await
}

async fn index(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let loaded = match scope {
        Ok(scope) => list_network_rows(state.network.as_ref(), &scope).await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    let rows = loaded.unwrap_or_else(|e| {
        flash_failure(&mut ctx, "Unable to get network list", &e);
        Vec::new()
    });
    let extra = json!({"body_id": "networks", "table": networks_table().context(&rows)});
    render_page(&state, ctx, render::TABLE_PAGE, "Networks", StatusCode::OK, extra).await
}

async fn index_action(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        return render_error(&state, ctx, &csrf_error(), INDEX_URL).await;
    }
    let table = networks_table();
    let Some(request) = data.get("action").and_then(|a| table.parse_action(a)) else {
        ctx.session.messages.error("Unknown table action.");
        return ctx.finish(&state, redirect(INDEX_URL));
    };
    if !request.action.is_delete() {
        return ctx.finish(&state, redirect(INDEX_URL));
    }
    let ids = match request.object_id.clone() {
        Some(id) => vec![id],
        None => form_values(&pairs, "object_ids"),
    };
    if ids.is_empty() {
        ctx.session.messages.info("Please select a row before taking that action.");
        return ctx.finish(&state, redirect(INDEX_URL));
    }
    let scope = match scope {
        Ok(s) => s,
        Err(e) => {
            flash_failure(&mut ctx, &request.action.failure_message(&ids), &e);
            return ctx.finish(&state, redirect(INDEX_URL));
        }
    };
    for id in ids {
        let display = match state.network.get_network_details(&scope, &id).await {
            Ok(d) if !d.name.is_empty() => d.name,
            _ => id.clone(),
        };
        match state.network.delete_network(&scope, &id).await {
            Ok(()) => {
                info!(target: "networks", request_id = %ctx.request_id, network = %id, "network deleted");
                ctx.session.messages.success(request.action.success_message(&[display]));
            }
            Err(e) => flash_failure(&mut ctx, &request.action.failure_message(&[display]), &AppError::from(e)),
        }
    }
    ctx.finish(&state, redirect(INDEX_URL))
}

async fn create_page(State(state): State<AppState>, ctx: RequestContext) -> Response {
    if ctx.user.is_none() {
        return login_redirect(&state, ctx);
    }
    render_form(&state, ctx, &create_network_form(), &HashMap::new(), None, INDEX_URL, None).await
}

async fn create_submit(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        return render_error(&state, ctx, &csrf_error(), INDEX_URL).await;
    }
    let form = create_network_form();
    let cleaned = match form.validate(&data) {
        Ok(c) => c,
        Err(errors) => return render_form(&state, ctx, &form, &data, Some(&errors), INDEX_URL, None).await,
    };
    let name = cleaned.str("name");
    let created = match scope {
        Ok(scope) => state.network.create_network(&scope, name).await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    match created {
        Ok(net) => {
            info!(target: "networks", request_id = %ctx.request_id, network = %net.id, name = %name, "network created");
            ctx.session.messages.success(format!("Network {} has been created.", name));
        }
        Err(e) => flash_failure(&mut ctx, &format!("Unable to create network {}", name), &e),
    }
    ctx.finish(&state, redirect(INDEX_URL))
}

/// Load the network being renamed; a failure ends the request with a 404 page.
async fn rename_target(
    state: &AppState,
    ctx: &mut RequestContext,
    scope: Result<ServiceScope, AppError>,
    network_id: &str,
) -> Result<(ServiceScope, String), AppError> {
    let loaded = match scope {
        Ok(scope) => match state.network.get_network_details(&scope, network_id).await {
            Ok(details) => Ok((scope, details.name)),
            Err(e) => Err(AppError::from(e)),
        },
        Err(e) => Err(e),
    };
    loaded.map_err(|e| {
        flash_failure(ctx, "Unable to update network", &e);
        AppError::not_found("network_not_found".to_string(), format!("Network with ID {} not found.", network_id))
    })
}

async fn rename_page(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    mut ctx: RequestContext,
) -> Response {
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let name = match rename_target(&state, &mut ctx, scope, &network_id).await {
        Ok((_, name)) => name,
        Err(e) => return render_error(&state, ctx, &e, INDEX_URL).await,
    };
    let values: HashMap<String, String> =
        [("network".to_string(), network_id), ("new_name".to_string(), name.clone())].into();
    let description = Some(format!("Current name: {}", name));
    render_form(&state, ctx, &rename_network_form(), &values, None, INDEX_URL, description).await
}

async fn rename_submit(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let mut data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        return render_error(&state, ctx, &csrf_error(), INDEX_URL).await;
    }
    let scope = match rename_target(&state, &mut ctx, scope, &network_id).await {
        Ok((scope, _)) => scope,
        Err(e) => return render_error(&state, ctx, &e, INDEX_URL).await,
    };
    data.insert("network".to_string(), network_id.clone());
    let form = rename_network_form();
    let cleaned = match form.validate(&data) {
        Ok(c) => c,
        Err(errors) => return render_form(&state, ctx, &form, &data, Some(&errors), INDEX_URL, None).await,
    };
    let new_name = cleaned.str("new_name");
    match state.network.rename_network(&scope, &network_id, new_name).await {
        Ok(()) => {
            info!(target: "networks", request_id = %ctx.request_id, network = %network_id, name = %new_name, "network renamed");
            ctx.session.messages.success(format!("Network {} has been updated.", new_name));
        }
        Err(e) => flash_failure(&mut ctx, &format!("Unable to rename network {}", network_id), &AppError::from(e)),
    }
    ctx.finish(&state, redirect(INDEX_URL))
}

async fn detail(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    mut ctx: RequestContext,
) -> Response {
    let (Some(net_scope), Some(compute_scope)) = (network_scope(&state, &ctx), compute_scope(&state, &ctx)) else {
        return login_redirect(&state, ctx);
    };
    let loaded = async {
        let net_scope = net_scope?;
        let compute_scope = compute_scope?;
        let details = state.network.get_network_details(&net_scope, &network_id).await?;
        let ports = get_port_states(state.network.as_ref(), state.compute.as_ref(), &net_scope, &compute_scope, &network_id).await?;
        Ok::<_, AppError>((details, ports, net_scope.tenant_id))
    }
    .await;
    let (details, ports, tenant) = match loaded {
        Ok(v) => v,
        Err(e) => {
            flash_failure(&mut ctx, "Unable to get network details", &e);
            return ctx.finish(&state, redirect(INDEX_URL));
        }
    };
    let ports: Vec<serde_json::Value> = ports
        .into_iter()
        .map(|p| {
            let toggle_to = PortState::parse(&p.state).map(|s| s.toggled()).unwrap_or(PortState::Active);
            let toggle_label = match toggle_to {
                PortState::Active => "On",
                PortState::Down => "Off",
            };
            json!({
                "id": p.id,
                "state": p.state,
                "attachment": p.attachment,
                "instance": p.instance,
                "toggle_to": toggle_to.as_str(),
                "toggle_label": toggle_label,
            })
        })
        .collect();
    let extra = json!({
        "network": {"id": network_id, "name": details.name, "ports": ports},
        "tenant": tenant,
        "delete_port_form": delete_port_form().name,
        "detach_port_form": detach_port_form().name,
        "toggle_port_form": toggle_port_form().name,
    });
    let title = format!("Network Detail: {}", details.name);
    render_page(&state, ctx, render::NETWORK_DETAIL, &title, StatusCode::OK, extra).await
}

/// Port operations posted from the detail page, told apart by their `method` field.
async fn detail_action(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let back = detail_url(&network_id);
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let mut data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        return render_error(&state, ctx, &csrf_error(), &back).await;
    }
    data.insert("network".to_string(), network_id.clone());

    let forms = [delete_port_form(), detach_port_form(), toggle_port_form()];
    let Some(form) = forms.iter().find(|f| f.is_submitted(&data)) else {
        return ctx.finish(&state, redirect(&back));
    };
    let cleaned = match form.validate(&data) {
        Ok(c) => c,
        Err(errors) => {
            let reason = errors.fields.values().flatten().cloned().collect::<Vec<_>>().join(" ");
            ctx.session.messages.error(format!("Invalid port request: {}", reason));
            return ctx.finish(&state, redirect(&back));
        }
    };
    let scope = match scope {
        Ok(s) => s,
        Err(e) => {
            flash_failure(&mut ctx, "Unable to update port", &e);
            return ctx.finish(&state, redirect(&back));
        }
    };
    let port_id = cleaned.str("port");
    let api = state.network.as_ref();
    let (outcome, done, failed) = match form.name {
        "delete_port" => (
            api.delete_port(&scope, &network_id, port_id).await,
            format!("Port {} deleted.", port_id),
            format!("Unable to delete port {}", port_id),
        ),
        "detach_port" => (
            api.detach_port(&scope, &network_id, port_id).await,
            format!("Port {} detached.", port_id),
            format!("Unable to detach port {}", port_id),
        ),
        _ => {
            let target = PortState::parse(cleaned.str("state")).unwrap_or(PortState::Active);
            (
                api.set_port_state(&scope, &network_id, port_id, target).await,
                format!("Port {} state set to {}.", port_id, target.as_str()),
                format!("Unable to set port {} state", port_id),
            )
        }
    };
    match outcome {
        Ok(()) => {
            info!(target: "networks", request_id = %ctx.request_id, network = %network_id, port = %port_id, op = form.name, "port updated");
            ctx.session.messages.success(done);
        }
        Err(e) => flash_failure(&mut ctx, &failed, &AppError::from(e)),
    }
    ctx.finish(&state, redirect(&back))
}

async fn port_create_page(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    ctx: RequestContext,
) -> Response {
    if ctx.user.is_none() {
        return login_redirect(&state, ctx);
    }
    let back = detail_url(&network_id);
    let values: HashMap<String, String> = [("network".to_string(), network_id)].into();
    render_form(&state, ctx, &create_port_form(), &values, None, &back, None).await
}

async fn port_create_submit(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let back = detail_url(&network_id);
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let mut data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        return render_error(&state, ctx, &csrf_error(), &back).await;
    }
    data.insert("network".to_string(), network_id.clone());
    let form = create_port_form();
    let cleaned = match form.validate(&data) {
        Ok(c) => c,
        Err(errors) => return render_form(&state, ctx, &form, &data, Some(&errors), &back, None).await,
    };
    let count = cleaned.int("ports_num").unwrap_or(1);
    let created = async {
        let scope = scope?;
        for _ in 0..count {
            state.network.create_port(&scope, &network_id, PortState::Down).await?;
        }
        Ok::<_, AppError>(())
    }
    .await;
    match created {
        Ok(()) => {
            info!(target: "networks", request_id = %ctx.request_id, network = %network_id, count = count, "ports created");
            ctx.session.messages.success(format!("{} ports created.", count));
        }
        Err(e) => flash_failure(&mut ctx, "Unable to create ports", &e),
    }
    ctx.finish(&state, redirect(&back))
}

/// Interfaces a port can be attached to, as select choices.
async fn vif_choices(state: &AppState, ctx: &mut RequestContext) -> Vec<(String, String)> {
    let listed = match compute_scope(state, ctx) {
        Some(Ok(scope)) => state.compute.list_vifs(&scope).await.map_err(AppError::from),
        Some(Err(e)) => Err(e),
        None => Ok(Vec::new()),
    };
    match listed {
        Ok(vifs) => vifs
            .into_iter()
            .map(|v| {
                let owner = if v.instance_name.is_empty() { v.instance_id.clone() } else { v.instance_name.clone() };
                let label = format!("{} - {}", owner, v.id);
                (v.id, label)
            })
            .collect(),
        Err(e) => {
            flash_failure(ctx, "Unable to retrieve instance interfaces", &e);
            Vec::new()
        }
    }
}

async fn port_attach_page(
    State(state): State<AppState>,
    Path((network_id, port_id)): Path<(String, String)>,
    mut ctx: RequestContext,
) -> Response {
    if ctx.user.is_none() {
        return login_redirect(&state, ctx);
    }
    let choices = vif_choices(&state, &mut ctx).await;
    let back = detail_url(&network_id);
    let values: HashMap<String, String> = [("network".to_string(), network_id), ("port".to_string(), port_id)].into();
    render_form(&state, ctx, &attach_port_form(choices), &values, None, &back, None).await
}

async fn port_attach_submit(
    State(state): State<AppState>,
    Path((network_id, port_id)): Path<(String, String)>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let back = detail_url(&network_id);
    let scope = match network_scope(&state, &ctx) {
        None => return login_redirect(&state, ctx),
        Some(s) => s,
    };
    let mut data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        return render_error(&state, ctx, &csrf_error(), &back).await;
    }
    data.insert("network".to_string(), network_id.clone());
    data.insert("port".to_string(), port_id.clone());
    let form = attach_port_form(vif_choices(&state, &mut ctx).await);
    let cleaned = match form.validate(&data) {
        Ok(c) => c,
        Err(errors) => return render_form(&state, ctx, &form, &data, Some(&errors), &back, None).await,
    };
    let vif_id = cleaned.str("vif_id");
    let attached = match scope {
        Ok(scope) => state.network.attach_port(&scope, &network_id, &port_id, vif_id).await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    match attached {
        Ok(()) => {
            info!(target: "networks", request_id = %ctx.request_id, network = %network_id, port = %port_id, vif = %vif_id, "port attached");
            ctx.session.messages.success(format!("Port {} attached to interface {}.", port_id, vif_id));
        }
        Err(e) => flash_failure(&mut ctx, &format!("Unable to attach port {}", port_id), &e),
    }
    ctx.finish(&state, redirect(&back))
}
