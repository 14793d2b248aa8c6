//! Prompt templates for advice generation

use serde_json::Map;
use serde_json::Value;

/// Separator used when a list-valued field is substituted into a prompt
pub const LIST_SEPARATOR: &str = "，";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Template with `{name}` / `{{name}}` placeholders
///
/// Both brace forms resolve to the same value. Unknown names render as the
/// empty string. Substituted values are not escaped.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    segments: Vec<Segment>,
    variables: Vec<String>,
}

impl PromptTemplate {
    /// Create a new prompt template
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let segments = parse_segments(&template);
        let mut variables: Vec<String> = Vec::new();
        for segment in &segments {
            if let Segment::Placeholder(name) = segment {
                if !variables.contains(name) {
                    variables.push(name.clone());
                }
            }
        }
        Self {
            template,
            segments,
            variables,
        }
    }

    /// Fill in the template with field values
    #[must_use]
    pub fn render(&self, values: &Map<String, Value>) -> String {
        let mut result = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => result.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some(value) = values.get(name) {
                        result.push_str(&value_to_prompt_text(value));
                    }
                }
            }
        }
        result
    }

    /// Placeholder names in order of first appearance
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Build a value map from `(name, value)` pairs
pub fn prompt_values<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Render a JSON value the way it should appear inside a prompt
pub fn value_to_prompt_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_prompt_text)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        Value::Object(_) => value.to_string(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Read a placeholder name starting at `from`; returns the name and the index after it
fn read_name(chars: &[char], from: usize) -> Option<(String, usize)> {
    let mut end = from;
    while end < chars.len() && is_name_char(chars[end]) {
        end += 1;
    }
    (end > from).then(|| (chars[from..end].iter().collect(), end))
}

/// Match `{{name}}` or `{name}` at `start`
fn match_placeholder(chars: &[char], start: usize) -> Option<(String, usize)> {
    if chars.get(start + 1) == Some(&'{') {
        if let Some((name, end)) = read_name(chars, start + 2) {
            if chars.get(end) == Some(&'}') && chars.get(end + 1) == Some(&'}') {
                return Some((name, end + 2));
            }
        }
    }
    let (name, end) = read_name(chars, start + 1)?;
    (chars.get(end) == Some(&'}')).then_some((name, end + 1))
}

fn parse_segments(template: &str) -> Vec<Segment> {
    let chars: Vec<char> = template.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' {
            if let Some((name, next)) = match_placeholder(&chars, i) {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name));
                i = next;
                continue;
            }
        }
        literal.push(chars[i]);
        i += 1;
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Standard advice prompt templates
pub struct AdvicePrompts;

impl AdvicePrompts {
    /// Recommendation request; kept short to save tokens
    #[must_use]
    pub fn recommendation() -> PromptTemplate {
        PromptTemplate::new(
            "仅输出候选药物内的中文通用名JSON数组。无则返回[]。\n病历：{{medical_text}}\n检索：{{retrieved_info}}\n",
        )
    }

    /// Formulary rules sent ahead of each recommendation request
    #[must_use]
    pub fn formulary_rules() -> PromptTemplate {
        PromptTemplate::new(
            r#"你是一个专业的医疗用药推荐系统。接下来的每个问题我都会给你一段病历描述和检索出的相关医疗信息，你需要根据这些内容，从以下候选药物集合中仔细选择需要使用的药物。

重要要求：
1. 只能从候选药物集合中选择，不能推荐集合外的任何药物
2. 必须仔细分析病历中的症状、疾病、检查结果等信息
3. 必须结合检索出的相关医疗信息进行综合判断
4. 只返回药物名称的列表，格式为JSON数组，如：["药物1", "药物2"]
5. 如果根据病历和检索信息无法确定需要任何药物，则返回空数组：[]
6. 不要输出任何解释、剂量、用法、适应症等额外信息
7. 不要输出任何非药物名称的内容
8. 药物名称必须与候选集合中的名称完全一致

候选药物集合（共{{candidate_count}}种药物）：{{candidates}}

请严格按照以上要求执行，确保输出的准确性和一致性。"#,
        )
    }

    /// Condensed case description used as a retrieval query
    #[must_use]
    pub fn case_summary() -> PromptTemplate {
        PromptTemplate::new(
            "性别：{性别}；BMI：{BMI}；主诉：{主诉}；现病史：{现病史}；既往史：{既往史}；入院情况：{入院情况}；诊断：{出院诊断}",
        )
    }

    /// Ask the model to turn a case summary into a knowledge-graph query
    #[must_use]
    pub fn query_generation() -> PromptTemplate {
        PromptTemplate::new(
            "请根据以下病历摘要，提炼用于检索医学知识图谱的查询文本（疾病、症状、检查、药物名称），只输出查询文本，不要解释：\n{{case_summary}}",
        )
    }
}
