//! Remote vocabulary for the record types the gateway exposes.
//!
//! Leads, deals, contacts, companies and tasks share one CRUD shape and differ
//! only in method names, the id parameter and where the remote nests records.
//! Calendar and workgroup operations have their own shapes and are listed as
//! plain enums.

use serde_json::{Map, Value};

use crate::errors::ArgumentError;

#[derive(Debug, PartialEq, Eq)]
pub struct EntitySpec {
    /// Singular key used in tool names and envelopes (`lead`, `task`).
    pub key: &'static str,
    pub plural: &'static str,
    pub label: &'static str,
    pub get_tool: &'static str,
    pub list_method: &'static str,
    pub get_method: &'static str,
    pub add_method: &'static str,
    pub update_method: &'static str,
    pub fields_method: &'static str,
    /// Remote parameter carrying the record id on get/update calls.
    pub id_param: &'static str,
    /// Member of the get result holding the record, when the remote wraps it.
    pub record_key: Option<&'static str>,
    /// Path to the new id inside an add result; empty when the result is the id.
    pub created_id_path: &'static [&'static str],
    /// Member of the field-metadata result holding the field map.
    pub fields_key: Option<&'static str>,
    pub required_fields: &'static [&'static str],
    pub example_filter: &'static str,
    pub example_select: &'static str,
    pub example_order: &'static str,
    pub example_fields: &'static str,
}

pub static LEAD: EntitySpec = EntitySpec {
    key: "lead",
    plural: "leads",
    label: "Lead",
    get_tool: "get_lead",
    list_method: "crm.lead.list",
    get_method: "crm.lead.get",
    add_method: "crm.lead.add",
    update_method: "crm.lead.update",
    fields_method: "crm.lead.fields",
    id_param: "id",
    record_key: None,
    created_id_path: &[],
    fields_key: None,
    required_fields: &["TITLE"],
    example_filter: r#"{"STATUS_ID": "NEW"}"#,
    example_select: "ID,TITLE,NAME,EMAIL",
    example_order: r#"{"DATE_CREATE": "DESC"}"#,
    example_fields: r#"{"TITLE": "New lead", "NAME": "Gleb", "STATUS_ID": "NEW"}"#,
};

pub static DEAL: EntitySpec = EntitySpec {
    key: "deal",
    plural: "deals",
    label: "Deal",
    get_tool: "get_deal",
    list_method: "crm.deal.list",
    get_method: "crm.deal.get",
    add_method: "crm.deal.add",
    update_method: "crm.deal.update",
    fields_method: "crm.deal.fields",
    id_param: "id",
    record_key: None,
    created_id_path: &[],
    fields_key: None,
    required_fields: &[],
    example_filter: r#"{"STAGE_ID": "NEW"}"#,
    example_select: "ID,TITLE,OPPORTUNITY,STAGE_ID",
    example_order: r#"{"DATE_CREATE": "DESC"}"#,
    example_fields: r#"{"TITLE": "New deal", "OPPORTUNITY": 15000, "CURRENCY_ID": "USD"}"#,
};

pub static CONTACT: EntitySpec = EntitySpec {
    key: "contact",
    plural: "contacts",
    label: "Contact",
    get_tool: "get_contact",
    list_method: "crm.contact.list",
    get_method: "crm.contact.get",
    add_method: "crm.contact.add",
    update_method: "crm.contact.update",
    fields_method: "crm.contact.fields",
    id_param: "id",
    record_key: None,
    created_id_path: &[],
    fields_key: None,
    required_fields: &[],
    example_filter: r#"{"TYPE_ID": "CLIENT"}"#,
    example_select: "ID,NAME,LAST_NAME,EMAIL,PHONE",
    example_order: r#"{"LAST_NAME": "ASC"}"#,
    example_fields: r#"{"NAME": "Anna", "LAST_NAME": "Smirnova", "TYPE_ID": "CLIENT"}"#,
};

pub static COMPANY: EntitySpec = EntitySpec {
    key: "company",
    plural: "companies",
    label: "Company",
    get_tool: "get_company",
    list_method: "crm.company.list",
    get_method: "crm.company.get",
    add_method: "crm.company.add",
    update_method: "crm.company.update",
    fields_method: "crm.company.fields",
    id_param: "id",
    record_key: None,
    created_id_path: &[],
    fields_key: None,
    required_fields: &["TITLE"],
    example_filter: r#"{"COMPANY_TYPE": "CUSTOMER"}"#,
    example_select: "ID,TITLE,COMPANY_TYPE,INDUSTRY",
    example_order: r#"{"TITLE": "ASC"}"#,
    example_fields: r#"{"TITLE": "Acme LLC", "COMPANY_TYPE": "CUSTOMER"}"#,
};

pub static TASK: EntitySpec = EntitySpec {
    key: "task",
    plural: "tasks",
    label: "Task",
    get_tool: "get_task_by_id",
    list_method: "tasks.task.list",
    get_method: "tasks.task.get",
    add_method: "tasks.task.add",
    update_method: "tasks.task.update",
    fields_method: "tasks.task.getFields",
    id_param: "taskId",
    record_key: Some("task"),
    created_id_path: &["task", "id"],
    fields_key: Some("fields"),
    required_fields: &["TITLE"],
    example_filter: r#"{"STATUS": "2"}"#,
    example_select: "ID,TITLE,STATUS,RESPONSIBLE_ID",
    example_order: r#"{"CREATED_DATE": "DESC"}"#,
    example_fields: r#"{"TITLE": "Prepare report", "RESPONSIBLE_ID": 1, "DEADLINE": "2024-12-31T23:59:59"}"#,
};

pub static CRUD_ENTITIES: [&EntitySpec; 5] = [&LEAD, &DEAL, &CONTACT, &COMPANY, &TASK];

impl EntitySpec {
    pub fn list_tool(&self) -> String {
        format!("get_{}", self.plural)
    }

    pub fn create_tool(&self) -> String {
        format!("create_{}", self.key)
    }

    pub fn update_tool(&self) -> String {
        format!("update_{}", self.key)
    }

    pub fn fields_tool(&self) -> String {
        format!("get_{}_fields", self.key)
    }

    /// Tool argument naming the record (`lead_id`, `task_id`).
    pub fn id_argument(&self) -> String {
        format!("{}_id", self.key)
    }

    pub fn check_required(&self, fields: &Map<String, Value>) -> Result<(), ArgumentError> {
        check_required_fields(fields, self.required_fields)
    }
}

/// Keys match case-insensitively; null and blank strings count as absent.
pub fn check_required_fields(
    fields: &Map<String, Value>,
    required: &[&str],
) -> Result<(), ArgumentError> {
    for name in required {
        let present = fields.iter().any(|(key, value)| {
            key.eq_ignore_ascii_case(name)
                && match value {
                    Value::Null => false,
                    Value::String(text) => !text.trim().is_empty(),
                    _ => true,
                }
        });
        if !present {
            return Err(ArgumentError::Missing(format!("fields.{name}")));
        }
    }
    Ok(())
}

/// One-shot task actions; the remote owns the lifecycle rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskAction {
    Complete,
    Approve,
    Start,
    Delegate,
    Renew,
    StartWatching,
    Disapprove,
}

impl TaskAction {
    pub const ALL: [TaskAction; 7] = [
        Self::Complete,
        Self::Approve,
        Self::Start,
        Self::Delegate,
        Self::Renew,
        Self::StartWatching,
        Self::Disapprove,
    ];

    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Complete => "complete_task",
            Self::Approve => "approve_task",
            Self::Start => "start_task",
            Self::Delegate => "delegate_task",
            Self::Renew => "renew_task",
            Self::StartWatching => "start_watching_task",
            Self::Disapprove => "disapprove_task",
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            Self::Complete => "tasks.task.complete",
            Self::Approve => "tasks.task.approve",
            Self::Start => "tasks.task.start",
            Self::Delegate => "tasks.task.delegate",
            Self::Renew => "tasks.task.renew",
            Self::StartWatching => "tasks.task.startwatch",
            Self::Disapprove => "tasks.task.disapprove",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Complete => "Complete Task",
            Self::Approve => "Approve Task",
            Self::Start => "Start Task",
            Self::Delegate => "Delegate Task",
            Self::Renew => "Renew Task",
            Self::StartWatching => "Start Watching Task",
            Self::Disapprove => "Disapprove Task",
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            Self::Complete => "Task completed successfully",
            Self::Approve => "Task approved successfully",
            Self::Start => "Task started successfully",
            Self::Delegate => "Task delegated successfully",
            Self::Renew => "Task renewed successfully",
            Self::StartWatching => "Started watching task successfully",
            Self::Disapprove => "Task disapproved successfully",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Complete => "Failed to complete task",
            Self::Approve => "Failed to approve task",
            Self::Start => "Failed to start task",
            Self::Delegate => "Failed to delegate task",
            Self::Renew => "Failed to renew task",
            Self::StartWatching => "Failed to start watching task",
            Self::Disapprove => "Failed to disapprove task",
        }
    }

    pub fn takes_user(self) -> bool {
        matches!(self, Self::Delegate)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalendarOperation {
    ListEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    ListSections,
    GetEvent,
    NearestEvents,
    GetMeetingStatus,
    SetMeetingStatus,
}

impl CalendarOperation {
    pub fn method(self) -> &'static str {
        match self {
            Self::ListEvents => "calendar.event.get",
            Self::CreateEvent => "calendar.event.add",
            Self::UpdateEvent => "calendar.event.update",
            Self::DeleteEvent => "calendar.event.delete",
            Self::ListSections => "calendar.section.get",
            Self::GetEvent => "calendar.event.getbyid",
            Self::NearestEvents => "calendar.event.get.nearest",
            Self::GetMeetingStatus => "calendar.meeting.status.get",
            Self::SetMeetingStatus => "calendar.meeting.status.set",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectOperation {
    List,
    Create,
    Update,
    Tasks,
    AddMember,
    Members,
    ExpelMember,
    RequestJoin,
    InviteMember,
}

impl ProjectOperation {
    pub fn method(self) -> &'static str {
        match self {
            Self::List => "sonet_group.get",
            Self::Create => "sonet_group.create",
            Self::Update => "sonet_group.update",
            Self::Tasks => "tasks.task.list",
            Self::AddMember => "sonet_group.user.add",
            Self::Members => "sonet_group.user.get",
            Self::ExpelMember => "sonet_group.user.expel",
            Self::RequestJoin => "sonet_group.user.request",
            Self::InviteMember => "sonet_group.user.invite",
        }
    }
}

pub const PROJECT_REQUIRED_FIELDS: &[&str] = &["NAME"];
pub const MEETING_STATUSES: &[&str] = &["Y", "N", "Q"];
pub const CALENDAR_TYPES: &[&str] = &["user", "group", "company_calendar"];

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{check_required_fields, TaskAction, CRUD_ENTITIES, LEAD, TASK};
    use crate::errors::ArgumentError;

    #[test]
    fn tool_names_follow_entity_keys() {
        assert_eq!(LEAD.list_tool(), "get_leads");
        assert_eq!(LEAD.create_tool(), "create_lead");
        assert_eq!(LEAD.fields_tool(), "get_lead_fields");
        assert_eq!(TASK.get_tool, "get_task_by_id");
        assert_eq!(TASK.id_argument(), "task_id");
    }

    #[test]
    fn method_prefixes_match_entity() {
        for entity in CRUD_ENTITIES {
            let prefix = entity.list_method.trim_end_matches(".list");
            assert!(entity.get_method.starts_with(prefix), "{}", entity.key);
            assert!(entity.add_method.starts_with(prefix), "{}", entity.key);
            assert!(entity.update_method.starts_with(prefix), "{}", entity.key);
        }
    }

    #[test]
    fn required_fields_match_case_insensitively() {
        let fields = json!({"title": "Website inquiry"});
        let fields = fields.as_object().cloned().unwrap_or_default();
        assert!(check_required_fields(&fields, &["TITLE"]).is_ok());
    }

    #[test]
    fn blank_required_field_is_missing() {
        let fields = json!({"TITLE": "  ", "NAME": "Gleb"});
        let fields = fields.as_object().cloned().unwrap_or_default();
        assert_eq!(
            check_required_fields(&fields, &["TITLE"]),
            Err(ArgumentError::Missing("fields.TITLE".to_owned()))
        );
    }

    #[test]
    fn only_delegate_takes_a_user() {
        let with_user: Vec<_> =
            TaskAction::ALL.iter().filter(|action| action.takes_user()).collect();
        assert_eq!(with_user, vec![&TaskAction::Delegate]);
        assert_eq!(TaskAction::StartWatching.method(), "tasks.task.startwatch");
    }
}
