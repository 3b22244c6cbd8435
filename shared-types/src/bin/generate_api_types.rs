use shared_types::*;
use std::fs;
use std::path::Path;
use ts_rs::TS;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Generate TypeScript definitions for the web UI
    let mut types = Vec::new();

    // Prompt routing and clarification
    types.push(clean_type(RoutePromptRequest::export_to_string()?));
    types.push(clean_type(RoutePromptResponse::export_to_string()?));
    types.push(clean_type(OptimizePromptRequest::export_to_string()?));
    types.push(clean_type(OptimizePromptResponse::export_to_string()?));
    types.push(clean_type(ReasoningAgentRequest::export_to_string()?));
    types.push(clean_type(ReasoningAgentResponse::export_to_string()?));
    types.push(clean_type(ChatRole::export_to_string()?));
    types.push(clean_type(ChatMessage::export_to_string()?));

    // Streaming
    types.push(clean_type(StreamRequest::export_to_string()?));
    types.push(clean_type(StreamPhase::export_to_string()?));
    types.push(clean_type(StreamKind::export_to_string()?));
    types.push(clean_type(StreamMessage::export_to_string()?));

    // Parameter form
    types.push(clean_type(MissingParameter::export_to_string()?));
    types.push(clean_type(ParameterForm::export_to_string()?));
    types.push(clean_type(ParameterAnswer::export_to_string()?));

    // Agents and actions
    types.push(clean_type(Agent::export_to_string()?));
    types.push(clean_type(SaveAgentRequest::export_to_string()?));
    types.push(clean_type(ExecutePromptRequest::export_to_string()?));
    types.push(clean_type(ActionRequest::export_to_string()?));
    types.push(clean_type(ActionCompletion::export_to_string()?));
    types.push(clean_type(ErrorResponse::export_to_string()?));

    let output_dir = Path::new("web/api-types");
    fs::create_dir_all(output_dir)?;

    let output_path = output_dir.join("types.ts");
    let output = types.join("\n\n");

    fs::write(&output_path, output)?;
    println!("Generated TypeScript types in {}", output_path.display());

    Ok(())
}

fn clean_type(mut type_def: String) -> String {
    type_def.retain(|c| c != '\r');
    let filtered: Vec<&str> = type_def
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with("import type")
                && !trimmed.starts_with("// This file was generated")
        })
        .collect();

    let result = filtered.join("\n").trim().to_string();
    if result.is_empty() {
        result
    } else {
        format!("{}\n", result)
    }
}
