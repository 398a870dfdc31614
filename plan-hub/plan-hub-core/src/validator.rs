//! Per-type content rules. Each node type maps to one plain validation
//! function; unknown keys are always allowed.

use std::collections::HashSet;

use serde_json::Value;

use crate::dependency::{TrackingMode, GRAPH_MODEL};
use crate::error::{HubError, Result};
use crate::node::{Content, NodeType};

const MAX_NAME_LEN: usize = 255;

type ContentRule = fn(&Content) -> std::result::Result<(), String>;

fn rule_for(node_type: NodeType) -> ContentRule {
    match node_type {
        NodeType::Model | NodeType::ModelTemplate => validate_model,
        NodeType::Simulation => validate_simulation,
        NodeType::ForecastSheet => validate_forecast_sheet,
        NodeType::ForecastVariableNumeric => validate_numeric_variable,
        NodeType::ForecastVariableBreakdown => validate_breakdown_variable,
        NodeType::Folder
        | NodeType::SimulationResult
        | NodeType::ForecastProject
        | NodeType::Meta => accept_any,
    }
}

pub fn validate_content(node_type: NodeType, content: &Content) -> Result<()> {
    rule_for(node_type)(content)
        .map_err(|msg| HubError::InvalidInput(format!("{} content: {msg}", node_type.as_str())))
}

pub fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(HubError::invalid("name must not be blank"));
    }
    if trimmed != name {
        return Err(HubError::invalid("name must not start or end with whitespace"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(HubError::invalid(format!(
            "name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if name.contains('/') {
        return Err(HubError::invalid("name must not contain '/'"));
    }
    Ok(())
}

fn accept_any(_: &Content) -> std::result::Result<(), String> {
    Ok(())
}

fn validate_model(content: &Content) -> std::result::Result<(), String> {
    if let Some(processes) = content.get("processes") {
        let processes = processes
            .as_object()
            .ok_or("processes must be an object keyed by process id")?;
        for (pid, process) in processes {
            let process = process
                .as_object()
                .ok_or_else(|| format!("process {pid} must be an object"))?;
            let kind = process
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("process {pid} is missing a type"))?;
            if kind == GRAPH_MODEL {
                process
                    .get("ref")
                    .and_then(Value::as_str)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| format!("process {pid} must reference a model"))?;
                validate_tracking(process.get("tracking"), process.get("release"))
                    .map_err(|e| format!("process {pid}: {e}"))?;
            }
        }
    }
    for key in ["inports", "outports"] {
        if let Some(ports) = content.get(key) {
            let ports = ports
                .as_array()
                .ok_or_else(|| format!("{key} must be a list"))?;
            let mut seen = HashSet::new();
            for port in ports {
                let id = port
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("every entry of {key} needs a string id"))?;
                if !seen.insert(id) {
                    return Err(format!("duplicate port id {id} in {key}"));
                }
            }
        }
    }
    if let Some(connections) = content.get("connections") {
        let connections = connections.as_array().ok_or("connections must be a list")?;
        for (i, conn) in connections.iter().enumerate() {
            for end in ["from", "to"] {
                conn.get(end)
                    .and_then(|e| e.get("port"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("connection {i} needs {end}.port"))?;
            }
        }
    }
    Ok(())
}

fn validate_simulation(content: &Content) -> std::result::Result<(), String> {
    if let Some(model) = content.get("ref") {
        if !model.is_string() {
            return Err("ref must be a node id".into());
        }
        validate_tracking(content.get("tracking"), content.get("release"))?;
    }
    if let Some(sheets) = content.get("forecastSheets") {
        let sheets = sheets.as_array().ok_or("forecastSheets must be a list")?;
        if sheets.iter().any(|s| !s.is_string()) {
            return Err("forecastSheets must contain node ids".into());
        }
    }
    Ok(())
}

fn validate_forecast_sheet(content: &Content) -> std::result::Result<(), String> {
    if let Some(vars) = content.get("variables") {
        let vars = vars.as_array().ok_or("variables must be a list")?;
        if vars.iter().any(|v| !v.is_string()) {
            return Err("variables must contain node ids".into());
        }
    }
    Ok(())
}

fn validate_numeric_variable(content: &Content) -> std::result::Result<(), String> {
    if let Some(values) = content.get("values") {
        let values = values.as_array().ok_or("values must be a list")?;
        if values.iter().any(|v| !(v.is_number() || v.is_null())) {
            return Err("values must be numbers or null".into());
        }
    }
    Ok(())
}

fn validate_breakdown_variable(content: &Content) -> std::result::Result<(), String> {
    if let Some(segments) = content.get("segments") {
        let segments = segments.as_array().ok_or("segments must be a list")?;
        for segment in segments {
            segment
                .get("name")
                .and_then(Value::as_str)
                .ok_or("each segment needs a name")?;
        }
    }
    Ok(())
}

fn validate_tracking(tracking: Option<&Value>, release: Option<&Value>) -> std::result::Result<(), String> {
    let mode = match tracking {
        None | Some(Value::Null) => TrackingMode::CurrentVersion,
        Some(v) => serde_json::from_value::<TrackingMode>(v.clone())
            .map_err(|_| format!("unknown tracking mode {v}"))?,
    };
    if mode == TrackingMode::Fixed {
        match release.and_then(Value::as_u64) {
            Some(n) if n >= 1 => {}
            _ => return Err("FIXED tracking needs a release number >= 1".into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(value: Value) -> Content {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn model_with_graph_process_is_valid() {
        let c = content(json!({
            "processes": {"p": {"type": "GRAPH_MODEL", "ref": "abc", "tracking": "FIXED", "release": 2}},
            "inports": [{"id": "in1"}],
            "outports": [{"id": "out1"}],
            "connections": [{"from": {"port": "in1"}, "to": {"process": "p", "port": "x"}}]
        }));
        validate_content(NodeType::Model, &c).unwrap();
    }

    #[test]
    fn fixed_tracking_requires_release() {
        let c = content(json!({
            "processes": {"p": {"type": "GRAPH_MODEL", "ref": "abc", "tracking": "FIXED"}}
        }));
        assert!(matches!(
            validate_content(NodeType::Model, &c),
            Err(HubError::InvalidInput(_))
        ));
    }

    #[test]
    fn duplicate_ports_rejected() {
        let c = content(json!({"inports": [{"id": "a"}, {"id": "a"}]}));
        assert!(validate_content(NodeType::Model, &c).is_err());
    }

    #[test]
    fn folders_accept_anything() {
        let c = content(json!({"anything": [1, 2, {"x": null}]}));
        validate_content(NodeType::Folder, &c).unwrap();
    }

    #[test]
    fn simulation_sheets_must_be_ids() {
        let c = content(json!({"ref": "m", "forecastSheets": [1]}));
        assert!(validate_content(NodeType::Simulation, &c).is_err());
    }

    #[test]
    fn names() {
        validate_name("Budget 2024").unwrap();
        assert!(validate_name("").is_err());
        assert!(validate_name("  ").is_err());
        assert!(validate_name(" padded").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(&"x".repeat(256)).is_err());
    }
}
