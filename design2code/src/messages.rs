//! Human-readable status and stage messages reported to pollers

use design2code_sdk::TaskStatus;

pub const CREATE_OK: &str = "Task created successfully, waiting for execution.";
pub const QUERY_RUNNING: &str = "Task is running, please wait.";
pub const QUERY_OK: &str = "Task finished, download the output from the url.";
pub const QUERY_FAIL: &str = "Task failed, download the log from the url.";
pub const QUERY_ADMIN_STOP: &str = "Task was stopped by an administrator, please retry.";
pub const QUERY_STOPPED: &str = "Task was stopped.";
pub const QUERY_UNKNOWN_ID: &str = "Task ID does not exist, please check.";
pub const INVALID_TASK_ID: &str = "task_id must be an integer, please check the input.";

pub fn create_limit_reached(limit: usize) -> String {
    format!("The number of running tasks exceeds the maximum limit {}.", limit)
}

/// Message shown for a task in `status`
pub fn status_message(status: TaskStatus, running_limit: usize) -> String {
    match status {
        TaskStatus::Creating | TaskStatus::Running => QUERY_RUNNING.to_string(),
        TaskStatus::CreateFail => create_limit_reached(running_limit),
        TaskStatus::Succeeded => QUERY_OK.to_string(),
        TaskStatus::Failed => QUERY_FAIL.to_string(),
        TaskStatus::AdminStop => QUERY_ADMIN_STOP.to_string(),
        TaskStatus::Stop => QUERY_STOPPED.to_string(),
        TaskStatus::Unknown => QUERY_UNKNOWN_ID.to_string(),
    }
}

/// Message for the last entered stage; loop stages carry their visit count
pub fn stage_message(history: &[String]) -> String {
    let Some(last) = history.last() else {
        return "Unknown stage".to_string();
    };
    let attempt = history.iter().filter(|s| *s == last).count();

    match last.as_str() {
        "export_document" => "Exporting design document".to_string(),
        "init_workspace" => "Initializing workspace".to_string(),
        "export_assets" => "Downloading design assets".to_string(),
        "capture_screenshot" => "Saving design screenshot".to_string(),
        "recognize_components" => "Recognizing components".to_string(),
        "lookup_knowledge" => "Loading component knowledge".to_string(),
        "coder" => format!("Generating code (attempt {})", attempt),
        "replace_tester" => format!("Updating test harness (attempt {})", attempt),
        "compile" => format!("Compiling code (attempt {})", attempt),
        "bugfix" => format!("Fixing errors (attempt {})", attempt),
        "preview" => "Rendering code preview".to_string(),
        "cleanup" => "Removing unused assets".to_string(),
        "evaluate" => "Evaluating result".to_string(),
        "finalize" => "Packaging output".to_string(),
        _ => String::new(),
    }
}
