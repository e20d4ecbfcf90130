use crate::{
    languages::{InputSource, LanguageRuntime},
    types::Language,
};

pub struct PythonRuntime;

impl LanguageRuntime for PythonRuntime {
    fn language(&self) -> Language {
        Language::Python
    }

    fn file_name(&self) -> &'static str {
        "main.py"
    }

    fn host_interpreter(&self) -> &'static str {
        "python3"
    }

    fn container_interpreter(&self) -> &'static str {
        "python"
    }

    fn inline_flag(&self) -> &'static str {
        "-c"
    }

    fn render(&self, user_code: &str, input: &InputSource<'_>) -> String {
        let load_input = match input {
            InputSource::Literal(encoded) => format!(
                "_faas_json.loads(_faas_base64.b64decode(\"{}\").decode(\"utf-8\"))",
                encoded
            ),
            InputSource::Argument => "_faas_json.loads(_faas_sys.argv[1])".to_string(),
        };

        // ru_maxrss is reported in KiB on Linux
        format!(
            r#"import base64 as _faas_base64
import json as _faas_json
import resource as _faas_resource
import sys as _faas_sys

{user_code}

if __name__ == "__main__":
    _faas_result = main({load_input})
    _faas_usage = _faas_resource.getrusage(_faas_resource.RUSAGE_SELF)
    print(_faas_json.dumps({{
        "result": _faas_result,
        "metrics": {{
            "memory": _faas_usage.ru_maxrss * 1024,
            "cpu": (_faas_usage.ru_utime + _faas_usage.ru_stime) * 1000,
        }},
    }}))
"#
        )
    }
}
