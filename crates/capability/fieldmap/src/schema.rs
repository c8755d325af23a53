//! 设备类型模式解析
//!
//! 两种模式格式各有独立解析函数，输出统一的 FieldDescriptor
//! 中间表示，合并逻辑不关心字段来自哪种格式。
//!
//! 类型映射表：
//! - numeric / integer / float / double -> Number
//! - string -> String
//! - boolean -> Boolean
//! - object / record -> Object
//! - array -> Array
//! - 无显式类型但 format 提示日期 -> Timestamp

use domain::DataType;

/// 设备类型模式（按 schemaFormat 显式分派）。
#[derive(Debug, Clone)]
pub enum DeviceSchema {
    JsonSchema(serde_json::Value),
    RecordFields(Vec<RecordField>),
}

/// 记录式模式的单个字段声明。
#[derive(Debug, Clone)]
pub struct RecordField {
    pub name: String,
    pub data_type: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

/// 模式解析后的字段中间表示。
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub field_name: String,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

/// 类型标签 + format 提示 -> 规范化数据类型。
pub fn map_data_type(type_tag: Option<&str>, format: Option<&str>) -> DataType {
    match type_tag {
        Some("numeric") | Some("integer") | Some("float") | Some("double") | Some("number") => {
            DataType::Number
        }
        Some("string") => DataType::String,
        Some("boolean") => DataType::Boolean,
        Some("object") | Some("record") => DataType::Object,
        Some("array") => DataType::Array,
        _ => {
            if format
                .map(|hint| hint.contains("date") || hint.contains("time"))
                .unwrap_or(false)
            {
                DataType::Timestamp
            } else {
                DataType::String
            }
        }
    }
}

/// 解析 JSON Schema 格式（properties 对象逐键提取）。
pub fn parse_json_schema(schema: &serde_json::Value) -> Vec<FieldDescriptor> {
    let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    let mut fields = Vec::new();
    for (name, spec) in properties {
        let type_tag = spec.get("type").and_then(|v| v.as_str());
        let format = spec.get("format").and_then(|v| v.as_str());
        fields.push(FieldDescriptor {
            field_name: name.clone(),
            friendly_name: spec
                .get("title")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            description: spec
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            data_type: map_data_type(type_tag, format),
            unit: spec.get("unit").and_then(|v| v.as_str()).map(str::to_string),
            min_value: spec.get("minimum").and_then(|v| v.as_f64()),
            max_value: spec.get("maximum").and_then(|v| v.as_f64()),
        });
    }
    fields
}

/// 解析记录字段格式。
pub fn parse_record_fields(fields: &[RecordField]) -> Vec<FieldDescriptor> {
    fields
        .iter()
        .map(|field| FieldDescriptor {
            field_name: field.name.clone(),
            friendly_name: None,
            description: field.description.clone(),
            data_type: map_data_type(field.data_type.as_deref(), field.format.as_deref()),
            unit: field.unit.clone(),
            min_value: field.min_value,
            max_value: field.max_value,
        })
        .collect()
}

/// 解析任一模式格式。
pub fn parse_schema(schema: &DeviceSchema) -> Vec<FieldDescriptor> {
    match schema {
        DeviceSchema::JsonSchema(value) => parse_json_schema(value),
        DeviceSchema::RecordFields(fields) => parse_record_fields(fields),
    }
}

/// 原始字段名 -> 标题式友好名（`battery_level` -> `Battery Level`）。
pub fn title_case(field_name: &str) -> String {
    field_name
        .split(|c: char| c == '_' || c == '-' || c == '.')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table_covers_known_tags() {
        assert_eq!(map_data_type(Some("integer"), None), DataType::Number);
        assert_eq!(map_data_type(Some("double"), None), DataType::Number);
        assert_eq!(map_data_type(Some("string"), None), DataType::String);
        assert_eq!(map_data_type(Some("boolean"), None), DataType::Boolean);
        assert_eq!(map_data_type(Some("record"), None), DataType::Object);
        assert_eq!(map_data_type(Some("array"), None), DataType::Array);
    }

    #[test]
    fn missing_type_with_date_format_is_timestamp() {
        assert_eq!(map_data_type(None, Some("date-time")), DataType::Timestamp);
        assert_eq!(map_data_type(None, Some("unix-time")), DataType::Timestamp);
        assert_eq!(map_data_type(None, None), DataType::String);
    }

    #[test]
    fn json_schema_properties_are_extracted() {
        let schema = serde_json::json!({
            "properties": {
                "temperature": {
                    "type": "number",
                    "title": "Temp",
                    "unit": "°C",
                    "minimum": -40.0,
                    "maximum": 125.0
                },
                "reported_at": { "format": "date-time" }
            }
        });
        let mut fields = parse_json_schema(&schema);
        fields.sort_by(|a, b| a.field_name.cmp(&b.field_name));
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field_name, "reported_at");
        assert_eq!(fields[0].data_type, DataType::Timestamp);
        assert_eq!(fields[1].friendly_name.as_deref(), Some("Temp"));
        assert_eq!(fields[1].min_value, Some(-40.0));
    }

    #[test]
    fn title_case_splits_on_separators() {
        assert_eq!(title_case("battery_level"), "Battery Level");
        assert_eq!(title_case("signal-strength"), "Signal Strength");
        assert_eq!(title_case("sensors.temp"), "Sensors Temp");
        assert_eq!(title_case("rpm"), "Rpm");
    }
}
