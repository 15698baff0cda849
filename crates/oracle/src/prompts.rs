//! Prompt text sent to the oracle.

pub const SCRIPT_ANALYSIS_SYSTEM: &str = r#"You analyze scripts that are about to be packaged as a container image whose entrypoint runs the script.

Work out:
1. the language and any version constraints,
2. system packages and runtime tools the script needs,
3. environment variables it reads,
4. how it is invoked and what it does, step by step.

Answer with a single JSON object and nothing else, shaped like this:
{
  "language": "Bash",
  "version_requirements": { "bash": ">= 3.0" },
  "system_dependencies": ["coreutils"],
  "environment_variables": [],
  "execution_pattern": {
    "description": "Counts the lines of its only argument and prints the total.",
    "steps": [
      { "step": 1, "description": "Exit with a usage message unless exactly one argument is given." },
      { "step": 2, "description": "Pipe the argument through wc -l and print the result." }
    ],
    "example": "./line_counter.sh \"one\ntwo\""
  }
}"#;

pub const EXAMPLE_ANALYSIS_SYSTEM: &str = r#"You read usage examples for a script and return the arguments to pass to a container whose entrypoint already runs that script.

Rules:
- Find the actual example invocation, not the prose describing it.
- Drop the interpreter and script name (python tool.py, ./tool.sh, node app.js, ...).
- Return only the remaining arguments on one line, with their quoting intact.
- Do not add explanations.

Example input:
To run it:
```bash
python report.py --input data.csv --verbose
```
Example output:
--input data.csv --verbose"#;

pub const ARTIFACT_SYSTEM: &str = r#"You write Dockerfiles for single scripts.

Requirements for every Dockerfile you produce:
- Prefer a full base image such as debian or ubuntu over alpine.
- Install every dependency the script needs and configure its environment.
- COPY the script from the build context root into the image.
- Use ENTRYPOINT so that arguments given to `docker run` reach the script.

Your answer is built and run automatically. Reply with the Dockerfile inside one ```dockerfile fenced block and nothing else. When told that a build or run failed, reply with a corrected Dockerfile in the same form."#;

pub fn script_analysis(script: &str) -> String {
    format!("Analyze this script and report its requirements:\n\n{script}")
}

pub fn example_analysis(example: &str) -> String {
    format!("Extract the container arguments from this example:\n\n{example}")
}

pub fn artifact(requirements_json: &str, script_filename: &str, command: &str) -> String {
    format!(
        "Write a Dockerfile for a script with these requirements:\n{requirements_json}\n\n\
         The script file '{script_filename}' sits next to the Dockerfile in the build context; \
         reference it by that name in COPY and ENTRYPOINT.\n\n\
         The image will be tested by running it with these arguments:\n{command}"
    )
}

pub fn repair(error: &str) -> String {
    format!(
        "The last Dockerfile did not work. The failure was:\n\n{error}\n\n\
         Fix the Dockerfile and reply with the complete corrected version."
    )
}
