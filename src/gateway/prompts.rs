// Prompt templates, one per mode. Each embeds the user's instruction; the
// screenshot travels separately as an image part.
use crate::types::Mode;

pub fn build_prompt(mode: Mode, instruction: &str) -> String {
    match mode {
        Mode::Analyze => analyze_prompt(instruction),
        Mode::Plan => plan_prompt(instruction),
        Mode::Execute => execute_prompt(instruction),
    }
}

fn analyze_prompt(instruction: &str) -> String {
    format!(
        "Look at the attached screenshot and describe what is on screen. Cover:\n\
         1. UI elements such as buttons, inputs and menus\n\
         2. The application or website currently shown\n\
         3. Areas that can be clicked or otherwise interacted with\n\
         4. Visible text\n\
         5. The overall layout\n\
         \n\
         User request: {instruction}\n\
         \n\
         Give a detailed analysis, then suggest the next steps."
    )
}

fn plan_prompt(instruction: &str) -> String {
    format!(
        "Using the attached screenshot, plan how to fulfil this request: \"{instruction}\"\n\
         \n\
         Break it into steps. For every step give:\n\
         - \"type\": one of click, type, scroll, wait\n\
         - \"description\": the target element\n\
         - \"coordinates\": {{\"x\": <px>, \"y\": <px>}} when clicking\n\
         - \"textToType\": the text when typing\n\
         - \"confidence\": a number between 0 and 1\n\
         \n\
         Answer with the JSON array of steps only, no prose."
    )
}

fn execute_prompt(instruction: &str) -> String {
    format!(
        "Given the attached screenshot and the request \"{instruction}\", write precise \
         execution instructions including:\n\
         1. Exact pixel coordinates for every click\n\
         2. Keyboard shortcuts to press\n\
         3. Text to enter\n\
         4. The order in which to perform the actions\n\
         \n\
         Be specific enough that each instruction can be carried out without guessing."
    )
}
