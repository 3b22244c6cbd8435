use shared_types::{ActionRequest, ParameterAnswer, StreamRequest};

/// Everything downstream stages need to know about the submitted prompt.
///
/// Written once routing or clarification finishes and passed by value to the
/// stream and dispatch stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub original_prompt: String,
    pub optimized_prompt: String,
    pub needs_reasoning: bool,
    /// Values the user supplied through a parameter form
    pub parameters: Vec<ParameterAnswer>,
}

impl PromptContext {
    pub fn new(original_prompt: String, optimized_prompt: String, needs_reasoning: bool) -> Self {
        Self {
            original_prompt,
            optimized_prompt,
            needs_reasoning,
            parameters: Vec::new(),
        }
    }

    /// Record answers, replacing earlier values with the same name
    pub fn with_parameters(mut self, answers: Vec<ParameterAnswer>) -> Self {
        for answer in answers {
            match self.parameters.iter_mut().find(|p| p.name == answer.name) {
                Some(existing) => existing.value = answer.value,
                None => self.parameters.push(answer),
            }
        }
        self
    }

    /// Prompt sent to the generator: the optimized prompt plus any known
    /// parameter values, one `- name: value` line each.
    pub fn generation_prompt(&self) -> String {
        if self.parameters.is_empty() {
            return self.optimized_prompt.clone();
        }

        let mut prompt = format!("{}\n\nPARAMETER VALUES:\n", self.optimized_prompt.trim_end());
        for parameter in &self.parameters {
            prompt.push_str(&format!("- {}: {}\n", parameter.name, parameter.value));
        }
        prompt.push_str(
            "\nUse these parameter values in the implementation. \
             Do not ask for additional information; generate complete, working code.",
        );
        prompt
    }

    pub fn stream_request(&self) -> StreamRequest {
        StreamRequest::new(self.generation_prompt(), self.needs_reasoning)
    }

    pub fn action_request(&self, code: impl Into<String>) -> ActionRequest {
        ActionRequest {
            prompt: self.original_prompt.clone(),
            optimized_prompt: self.optimized_prompt.clone(),
            needs_reasoning: self.needs_reasoning,
            code: code.into(),
        }
    }
}
