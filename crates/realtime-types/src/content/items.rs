use crate::content::message::MessageItem;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    #[serde(rename = "message")]
    Message(MessageItem),
    #[serde(rename = "function_call")]
    FunctionCall(FunctionCallItem),
    #[serde(rename = "function_call_output")]
    FunctionCallOutput(FunctionCallOutputItem),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ItemStatus {
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "incomplete")]
    Incomplete,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct _Item {
    /// The unique ID of the item. Optional for client events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallItem {
    #[serde(flatten)]
    item: _Item,

    /// The ID correlating the call with its output item.
    call_id: Option<String>,

    name: Option<String>,

    /// The arguments as a JSON-encoded string.
    arguments: Option<String>,
}

impl FunctionCallItem {
    pub fn id(&self) -> Option<&str> {
        self.item.id.as_deref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn arguments(&self) -> Option<&str> {
        self.arguments.as_deref()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallOutputItem {
    #[serde(flatten)]
    item: _Item,

    call_id: Option<String>,

    /// The output of the function call, JSON-encoded.
    output: Option<String>,
}

impl FunctionCallOutputItem {
    pub fn new(call_id: &str, output: &str) -> Self {
        Self {
            item: _Item::default(),
            call_id: Some(call_id.to_string()),
            output: Some(output.to_string()),
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }
}
