use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, Access};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn require_super_admin(state: &AppState, req: &Request) -> Result<Access, serde_json::Value> {
    let conn = db_conn(state).map_err(|e| e.response(&req.id))?;
    let access = Access::resolve(conn, req).map_err(|e| e.response(&req.id))?;
    access
        .require_super_admin()
        .map_err(|e| e.response(&req.id))?;
    Ok(access)
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let access = match require_super_admin(state, req) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %out_path, "workspace export failed: {e:#}");
            return err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            );
        }
    };
    tracing::info!(path = %out_path, sha256 = %export.db_sha256, "workspace exported");

    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = access.audit(
            conn,
            "backup.export",
            None,
            Some(json!({ "path": out_path, "dbSha256": export.db_sha256 })),
        ) {
            // The bundle is already on disk.
            tracing::warn!(path = %out_path, code = e.code, "export audit not recorded: {}", e.message);
        }
    }

    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256
        }),
    )
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let access = match require_super_admin(state, req) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop open handle before replacing file.
    state.db = None;

    let import_result = backup::import_workspace_bundle(&src, &workspace_path);

    let conn = match db::open_db(&workspace_path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", e.to_string(), None),
    };
    let import = match import_result {
        Ok(v) => v,
        Err(e) => {
            state.db = Some(conn);
            tracing::warn!(path = %in_path, "workspace import failed: {e:#}");
            return err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            );
        }
    };
    tracing::info!(path = %in_path, format = %import.bundle_format_detected, "workspace imported");

    let audited = access.audit(
        &conn,
        "backup.import",
        None,
        Some(json!({ "path": in_path, "format": import.bundle_format_detected })),
    );
    state.db = Some(conn);
    if let Err(e) = audited {
        // The database has already been replaced.
        tracing::warn!(path = %in_path, code = e.code, "import audit not recorded: {}", e.message);
    }

    ok(
        &req.id,
        json!({
            "workspacePath": workspace_path.to_string_lossy(),
            "bundleFormatDetected": import.bundle_format_detected
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
