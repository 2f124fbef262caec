//! The fixed tool catalog: one descriptor per tool, built once and looked up by
//! name on every invocation.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{json, Map, Value};

use crate::entity::{
    CalendarOperation, EntitySpec, ProjectOperation, TaskAction, CALENDAR_TYPES, CRUD_ENTITIES,
    MEETING_STATUSES, PROJECT_REQUIRED_FIELDS, TASK,
};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const DEFAULT_NEAREST_DAYS: i64 = 60;

/// What a tool does once its arguments are validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List(&'static EntitySpec),
    Get(&'static EntitySpec),
    Create(&'static EntitySpec),
    Update(&'static EntitySpec),
    Fields(&'static EntitySpec),
    Task(TaskAction),
    Calendar(CalendarOperation),
    Project(ProjectOperation),
}

impl Operation {
    pub fn group(self) -> &'static str {
        match self {
            Self::List(entity)
            | Self::Get(entity)
            | Self::Create(entity)
            | Self::Update(entity)
            | Self::Fields(entity) => entity.plural,
            Self::Task(_) => TASK.plural,
            Self::Calendar(_) => "calendar",
            Self::Project(_) => "projects",
        }
    }

    pub fn is_read_only(self) -> bool {
        match self {
            Self::List(_) | Self::Get(_) | Self::Fields(_) => true,
            Self::Create(_) | Self::Update(_) | Self::Task(_) => false,
            Self::Calendar(operation) => matches!(
                operation,
                CalendarOperation::ListEvents
                    | CalendarOperation::ListSections
                    | CalendarOperation::GetEvent
                    | CalendarOperation::NearestEvents
                    | CalendarOperation::GetMeetingStatus
            ),
            Self::Project(operation) => matches!(
                operation,
                ProjectOperation::List | ProjectOperation::Tasks | ProjectOperation::Members
            ),
        }
    }

    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            Self::Calendar(CalendarOperation::DeleteEvent)
                | Self::Project(ProjectOperation::ExpelMember)
        )
    }

    /// Repeating the call leaves the remote in the same state.
    pub fn is_idempotent(self) -> bool {
        match self {
            Self::Create(_) => false,
            Self::Calendar(CalendarOperation::CreateEvent) => false,
            Self::Project(ProjectOperation::Create | ProjectOperation::RequestJoin) => false,
            Self::Project(ProjectOperation::InviteMember) => false,
            _ => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Record identifier; strings and numbers are both accepted.
    Id,
    Text,
    Integer { min: i64 },
    Boolean,
    /// JSON object, sent as encoded text or as a structured value.
    JsonObject,
    /// Comma-separated field names.
    FieldList,
    Date,
    Choice(&'static [&'static str]),
}

impl ParamKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Id | Self::Text | Self::JsonObject | Self::FieldList | Self::Date => "string",
            Self::Choice(_) => "string",
            Self::Integer { .. } => "integer",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self { name: name.into(), kind, required: true, default: None, description: description.into() }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self { name: name.into(), kind, required: false, default: None, description: description.into() }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_owned(), Value::from(self.kind.type_name()));
        schema.insert("description".to_owned(), Value::from(self.description.clone()));
        match self.kind {
            ParamKind::Integer { min } => {
                schema.insert("minimum".to_owned(), Value::from(min));
            }
            ParamKind::Choice(choices) => {
                schema.insert("enum".to_owned(), json!(choices));
            }
            _ => {}
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_owned(), default.clone());
        }
        Value::Object(schema)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub title: String,
    pub summary: String,
    pub example: String,
    pub operation: Operation,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            summary: summary.into(),
            example: String::new(),
            operation,
            params: Vec::new(),
        }
    }

    fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    fn params(mut self, params: impl IntoIterator<Item = ParamSpec>) -> Self {
        self.params.extend(params);
        self
    }

    fn example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|param| param.required)
    }

    pub fn optional_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|param| !param.required)
    }

    /// Human-readable description shown to assistant clients.
    pub fn description(&self) -> String {
        let mut text = self.summary.clone();

        text.push_str("\n\nRequired attributes:");
        let mut any_required = false;
        for param in self.required_params() {
            any_required = true;
            text.push_str(&format!("\n- {}: {}", param.name, param.description));
        }
        if !any_required {
            text.push_str(" none");
        }

        text.push_str("\n\nOptional attributes:");
        let mut any_optional = false;
        for param in self.optional_params() {
            any_optional = true;
            text.push_str(&format!("\n- {}: {}", param.name, param.description));
            if let Some(default) = &param.default {
                text.push_str(&format!(" (default: {default})"));
            }
        }
        if !any_optional {
            text.push_str(" none");
        }

        if !self.example.is_empty() {
            text.push_str("\n\nExample request: ");
            text.push_str(&self.example);
        }
        text
    }

    /// JSON schema of the arguments object.
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(param.name.clone(), param.schema());
        }
        let required: Vec<Value> =
            self.required_params().map(|param| Value::from(param.name.clone())).collect();

        let mut schema = Map::new();
        schema.insert("type".to_owned(), Value::from("object"));
        schema.insert("properties".to_owned(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_owned(), Value::Array(required));
        }
        schema.insert("additionalProperties".to_owned(), Value::Bool(false));
        schema
    }
}

#[derive(Debug)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Catalog shared by the server and the operator CLI.
    pub fn standard() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| Catalog::from_tools(build_tools()))
    }

    pub fn from_tools(tools: Vec<ToolDescriptor>) -> Self {
        let index =
            tools.iter().enumerate().map(|(position, tool)| (tool.name.clone(), position)).collect();
        Self { tools, index }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).and_then(|position| self.tools.get(*position))
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name.as_str())
    }
}

fn build_tools() -> Vec<ToolDescriptor> {
    let mut tools = Vec::new();
    for entity in CRUD_ENTITIES {
        tools.extend(entity_tools(entity));
    }
    tools.extend(task_action_tools());
    tools.extend(calendar_tools());
    tools.extend(project_tools());
    tools
}

fn id_param(name: impl Into<String>, label: &str) -> ParamSpec {
    ParamSpec::required(name, ParamKind::Id, format!("{label} ID"))
}

fn limit_param(noun: &str) -> ParamSpec {
    ParamSpec::optional(
        "limit",
        ParamKind::Integer { min: 0 },
        format!("Maximum number of {noun} to return, 0 returns all"),
    )
    .with_default(json!(DEFAULT_LIST_LIMIT))
}

fn start_param() -> ParamSpec {
    ParamSpec::optional(
        "start",
        ParamKind::Integer { min: 0 },
        "Offset of the first record, taken from next_start of a previous page",
    )
    .with_default(json!(0))
}

fn filter_param(example: &str) -> ParamSpec {
    ParamSpec::optional(
        "filter_params",
        ParamKind::JsonObject,
        format!("JSON object with filter conditions (e.g. '{example}')"),
    )
}

fn order_param(example: &str) -> ParamSpec {
    ParamSpec::optional(
        "order",
        ParamKind::JsonObject,
        format!("JSON object with sort order (e.g. '{example}')"),
    )
}

fn list_params(entity: &EntitySpec) -> Vec<ParamSpec> {
    vec![
        filter_param(entity.example_filter),
        ParamSpec::optional(
            "select_fields",
            ParamKind::FieldList,
            format!("Comma-separated field names (e.g. '{}')", entity.example_select),
        ),
        order_param(entity.example_order),
        limit_param(entity.plural),
        start_param(),
    ]
}

fn fields_description(entity: &EntitySpec, verb: &str) -> String {
    let mut description = format!("JSON object with {} fields to {verb}", entity.key);
    if verb == "create" && !entity.required_fields.is_empty() {
        description.push_str(&format!(" (must include {})", entity.required_fields.join(", ")));
    }
    description
}

fn entity_tools(entity: &'static EntitySpec) -> Vec<ToolDescriptor> {
    let id_argument = entity.id_argument();
    let plural_title = title_case(entity.plural);

    vec![
        ToolDescriptor::new(
            entity.list_tool(),
            format!("Get {plural_title}"),
            format!("List {} records with optional filters, field selection and ordering.", entity.key),
            Operation::List(entity),
        )
        .params(list_params(entity))
        .example(format!(
            "{}(filter_params='{}', select_fields='{}', limit=10)",
            entity.list_tool(),
            entity.example_filter,
            entity.example_select
        )),
        ToolDescriptor::new(
            entity.get_tool,
            format!("Get {}", entity.label),
            format!("Retrieve a single {} by ID.", entity.key),
            Operation::Get(entity),
        )
        .param(id_param(id_argument.clone(), entity.label))
        .example(format!("{}({id_argument}=\"123\")", entity.get_tool)),
        ToolDescriptor::new(
            entity.create_tool(),
            format!("Create {}", entity.label),
            format!("Create a new {}.", entity.key),
            Operation::Create(entity),
        )
        .param(ParamSpec::required("fields", ParamKind::JsonObject, fields_description(entity, "create")))
        .example(format!("{}(fields='{}')", entity.create_tool(), entity.example_fields)),
        ToolDescriptor::new(
            entity.update_tool(),
            format!("Update {}", entity.label),
            format!("Update an existing {}.", entity.key),
            Operation::Update(entity),
        )
        .param(id_param(id_argument.clone(), entity.label))
        .param(ParamSpec::required("fields", ParamKind::JsonObject, fields_description(entity, "update")))
        .example(format!(
            "{}({id_argument}=\"123\", fields='{}')",
            entity.update_tool(),
            entity.example_filter
        )),
        ToolDescriptor::new(
            entity.fields_tool(),
            format!("Get {} Fields", entity.label),
            format!("Retrieve metadata about the available {} fields.", entity.key),
            Operation::Fields(entity),
        )
        .example(format!("{}()", entity.fields_tool())),
    ]
}

fn task_action_tools() -> Vec<ToolDescriptor> {
    TaskAction::ALL
        .into_iter()
        .map(|action| {
            let mut tool = ToolDescriptor::new(
                action.tool_name(),
                action.title(),
                format!("{}.", action.title()),
                Operation::Task(action),
            )
            .param(id_param("task_id", TASK.label));
            if action.takes_user() {
                tool = tool
                    .param(ParamSpec::required("user_id", ParamKind::Id, "User ID to delegate to"))
                    .example(format!("{}(task_id=\"123\", user_id=\"7\")", action.tool_name()));
            } else {
                tool = tool.example(format!("{}(task_id=\"123\")", action.tool_name()));
            }
            tool
        })
        .collect()
}

fn calendar_tools() -> Vec<ToolDescriptor> {
    let event_id = || id_param("event_id", "Event");
    let event_fields = |verb: &str| {
        ParamSpec::required(
            "fields",
            ParamKind::JsonObject,
            format!("JSON object with event fields to {verb}"),
        )
    };

    vec![
        ToolDescriptor::new(
            "get_calendar_events",
            "Get Calendar Events",
            "List calendar events with optional filters and a date range.",
            Operation::Calendar(CalendarOperation::ListEvents),
        )
        .param(filter_param(r#"{"type": "user", "ownerId": 1}"#))
        .param(ParamSpec::optional("date_from", ParamKind::Date, "Start date (YYYY-MM-DD)"))
        .param(ParamSpec::optional("date_to", ParamKind::Date, "End date (YYYY-MM-DD)"))
        .param(limit_param("events"))
        .param(ParamSpec::optional(
            "sections",
            ParamKind::Text,
            "Calendar section IDs as a JSON array or a comma-separated list",
        ))
        .example(r#"get_calendar_events(date_from="2024-01-01", date_to="2024-01-31", limit=10)"#),
        ToolDescriptor::new(
            "create_calendar_event",
            "Create Calendar Event",
            "Create a new calendar event.",
            Operation::Calendar(CalendarOperation::CreateEvent),
        )
        .param(event_fields("create"))
        .example(
            r#"create_calendar_event(fields='{"type": "user", "ownerId": 2, "name": "Planning", "from": "2024-06-14", "to": "2024-06-14", "section": 5}')"#,
        ),
        ToolDescriptor::new(
            "update_calendar_event",
            "Update Calendar Event",
            "Update an existing calendar event.",
            Operation::Calendar(CalendarOperation::UpdateEvent),
        )
        .param(event_id())
        .param(event_fields("update"))
        .example(r#"update_calendar_event(event_id="123", fields='{"name": "Updated event"}')"#),
        ToolDescriptor::new(
            "delete_calendar_event",
            "Delete Calendar Event",
            "Delete a calendar event by ID.",
            Operation::Calendar(CalendarOperation::DeleteEvent),
        )
        .param(event_id())
        .example(r#"delete_calendar_event(event_id="123")"#),
        ToolDescriptor::new(
            "get_calendar_list",
            "Get Calendar List",
            "Retrieve the available calendars (sections).",
            Operation::Calendar(CalendarOperation::ListSections),
        )
        .param(ParamSpec::optional(
            "filter_params",
            ParamKind::JsonObject,
            "JSON object with request parameters (e.g. '{\"type\": \"user\", \"ownerId\": 1}'), type defaults to user",
        ))
        .example(r#"get_calendar_list(filter_params='{"type": "user", "ownerId": 1}')"#),
        ToolDescriptor::new(
            "get_calendar_event_by_id",
            "Get Calendar Event by ID",
            "Retrieve a calendar event with its participants, recurrence rules and metadata.",
            Operation::Calendar(CalendarOperation::GetEvent),
        )
        .param(event_id())
        .example(r#"get_calendar_event_by_id(event_id="123")"#),
        ToolDescriptor::new(
            "get_nearest_calendar_events",
            "Get Nearest Calendar Events",
            "Retrieve upcoming calendar events within a number of days.",
            Operation::Calendar(CalendarOperation::NearestEvents),
        )
        .param(
            ParamSpec::optional(
                "calendar_type",
                ParamKind::Choice(CALENDAR_TYPES),
                "Calendar type: user, group or company_calendar",
            )
            .with_default(json!("user")),
        )
        .param(ParamSpec::optional("owner_id", ParamKind::Integer { min: 0 }, "Calendar owner ID"))
        .param(
            ParamSpec::optional("days", ParamKind::Integer { min: 1 }, "Number of days to look ahead")
                .with_default(json!(DEFAULT_NEAREST_DAYS)),
        )
        .param(
            ParamSpec::optional(
                "for_current_user",
                ParamKind::Boolean,
                "Only return events of the current user",
            )
            .with_default(json!(true)),
        )
        .param(
            ParamSpec::optional(
                "max_events_count",
                ParamKind::Integer { min: 0 },
                "Maximum number of events to return, 0 means no limit",
            )
            .with_default(json!(0)),
        )
        .param(ParamSpec::optional("detail_url", ParamKind::Text, "Calendar detail URL template"))
        .example(r#"get_nearest_calendar_events(calendar_type="user", days=30, max_events_count=10)"#),
        ToolDescriptor::new(
            "get_meeting_status",
            "Get Meeting Status",
            "Check the current user's participation status for a meeting (Y, N or Q).",
            Operation::Calendar(CalendarOperation::GetMeetingStatus),
        )
        .param(event_id())
        .example(r#"get_meeting_status(event_id="123")"#),
        ToolDescriptor::new(
            "set_meeting_status",
            "Set Meeting Status",
            "Accept (Y), decline (N) or leave pending (Q) the current user's participation in a meeting.",
            Operation::Calendar(CalendarOperation::SetMeetingStatus),
        )
        .param(event_id())
        .param(ParamSpec::required(
            "status",
            ParamKind::Choice(MEETING_STATUSES),
            "Participation status: Y, N or Q",
        ))
        .example(r#"set_meeting_status(event_id="123", status="Y")"#),
    ]
}

fn project_tools() -> Vec<ToolDescriptor> {
    let project_id = || id_param("project_id", "Project");
    let user_id = |description: &'static str| ParamSpec::required("user_id", ParamKind::Id, description);

    vec![
        ToolDescriptor::new(
            "get_projects",
            "Get Projects",
            "List projects (workgroups) with optional filters and ordering.",
            Operation::Project(ProjectOperation::List),
        )
        .param(filter_param(r#"{"ACTIVE": "Y"}"#))
        .param(order_param(r#"{"NAME": "ASC"}"#))
        .param(limit_param("projects"))
        .param(start_param())
        .example(r#"get_projects(filter_params='{"ACTIVE": "Y"}', limit=10)"#),
        ToolDescriptor::new(
            "create_project",
            "Create Project",
            "Create a new project (workgroup).",
            Operation::Project(ProjectOperation::Create),
        )
        .param(ParamSpec::required(
            "fields",
            ParamKind::JsonObject,
            format!("JSON object with project fields (must include {})", PROJECT_REQUIRED_FIELDS.join(", ")),
        ))
        .example(r#"create_project(fields='{"NAME": "Launch", "VISIBLE": "Y", "OPENED": "N"}')"#),
        ToolDescriptor::new(
            "update_project",
            "Update Project",
            "Update an existing project.",
            Operation::Project(ProjectOperation::Update),
        )
        .param(project_id())
        .param(ParamSpec::required("fields", ParamKind::JsonObject, "JSON object with project fields to update"))
        .example(r#"update_project(project_id="123", fields='{"NAME": "Renamed"}')"#),
        ToolDescriptor::new(
            "get_project_tasks",
            "Get Project Tasks",
            "List tasks that belong to a project.",
            Operation::Project(ProjectOperation::Tasks),
        )
        .param(project_id())
        .param(limit_param("tasks"))
        .param(start_param())
        .example(r#"get_project_tasks(project_id="123", limit=10)"#),
        ToolDescriptor::new(
            "add_project_member",
            "Add Project Member",
            "Add a user to a project directly.",
            Operation::Project(ProjectOperation::AddMember),
        )
        .param(project_id())
        .param(user_id("User ID to add"))
        .param(
            ParamSpec::optional("role", ParamKind::Text, "Role for the user (member, moderator, ...)")
                .with_default(json!("member")),
        )
        .example(r#"add_project_member(project_id="123", user_id="456", role="moderator")"#),
        ToolDescriptor::new(
            "get_project_members",
            "Get Project Members",
            "Retrieve the members of a project and their roles.",
            Operation::Project(ProjectOperation::Members),
        )
        .param(project_id())
        .example(r#"get_project_members(project_id="123")"#),
        ToolDescriptor::new(
            "expel_project_member",
            "Expel Project Member",
            "Remove a user from a project.",
            Operation::Project(ProjectOperation::ExpelMember),
        )
        .param(project_id())
        .param(user_id("User ID to remove"))
        .example(r#"expel_project_member(project_id="123", user_id="456")"#),
        ToolDescriptor::new(
            "request_join_project",
            "Request to Join Project",
            "Ask the project owner to accept the current user as a member.",
            Operation::Project(ProjectOperation::RequestJoin),
        )
        .param(project_id())
        .param(ParamSpec::optional("message", ParamKind::Text, "Message attached to the request"))
        .example(r#"request_join_project(project_id="123", message="Please add me")"#),
        ToolDescriptor::new(
            "invite_project_member",
            "Invite Project Member",
            "Invite a user to a project; the user accepts or declines the invitation.",
            Operation::Project(ProjectOperation::InviteMember),
        )
        .param(project_id())
        .param(user_id("User ID to invite"))
        .param(ParamSpec::optional("message", ParamKind::Text, "Personal message for the invitation"))
        .example(r#"invite_project_member(project_id="123", user_id="456")"#),
    ]
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
