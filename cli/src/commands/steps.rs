//! Prints the workflow steps.

use soilscan::{StepInfo, WorkflowController};

use super::CommandResponse;

pub fn print_steps(json: bool) {
    let steps = WorkflowController::new().steps();
    if json {
        CommandResponse::ok(steps).print();
        return;
    }
    for line in format_steps(&steps) {
        println!("{}", line);
    }
}

fn format_steps(steps: &[StepInfo]) -> Vec<String> {
    let width = steps.iter().map(|s| s.name.len()).max().unwrap_or(0);
    steps
        .iter()
        .map(|step| format!("{}  {:<width$}  {}", step.id, step.name, step.description, width = width))
        .collect()
}
