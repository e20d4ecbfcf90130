use crate::{
    languages::{InputSource, LanguageRuntime},
    types::Language,
};

pub struct JavaScriptRuntime;

impl LanguageRuntime for JavaScriptRuntime {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn file_name(&self) -> &'static str {
        "main.js"
    }

    fn host_interpreter(&self) -> &'static str {
        "node"
    }

    fn container_interpreter(&self) -> &'static str {
        "node"
    }

    fn inline_flag(&self) -> &'static str {
        "-e"
    }

    fn render(&self, user_code: &str, input: &InputSource<'_>) -> String {
        let load_input = match input {
            InputSource::Literal(encoded) => format!(
                "JSON.parse(Buffer.from(\"{}\", \"base64\").toString(\"utf8\"))",
                encoded
            ),
            // argv[0] is node itself, argv[1] the script path
            InputSource::Argument => "JSON.parse(process.argv[2])".to_string(),
        };

        // `main` may return a promise; a rejection exits non-zero with the stack on stderr
        format!(
            r#"const __faasInput = {load_input};

{user_code}

Promise.resolve()
  .then(() => main(__faasInput))
  .then((result) => {{
    const usage = process.resourceUsage();
    const cpu = process.cpuUsage();
    process.stdout.write(JSON.stringify({{
      result,
      metrics: {{
        memory: usage.maxRSS * 1024,
        cpu: (cpu.user + cpu.system) / 1000,
      }},
    }}) + "\n");
  }})
  .catch((err) => {{
    process.stderr.write(String(err && err.stack ? err.stack : err) + "\n");
    process.exitCode = 1;
  }});
"#
        )
    }
}
