//! Typed todo commands and their `verb,arg1,arg2` wire encoding.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    domain::{AmlId, LineIndex, MoveId, RecoModelId},
    error::TodoCommandParseError,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormButton {
    Validate,
    Reset,
    ToCheck,
    SetAsChecked,
    ApplySuggestion,
    ApplyRecoModel,
    RedirectToMoveForm(MoveId),
    Other(String),
}

impl FormButton {
    pub fn name(&self) -> &str {
        match self {
            FormButton::Validate => "button_validate",
            FormButton::Reset => "button_reset",
            FormButton::ToCheck => "button_to_check",
            FormButton::SetAsChecked => "button_set_as_checked",
            FormButton::ApplySuggestion => "button_form_apply_suggestion",
            FormButton::ApplyRecoModel => "button_apply_reco_model",
            FormButton::RedirectToMoveForm(_) => "button_form_redirect_to_move_form",
            FormButton::Other(name) => name,
        }
    }

    fn parse(name: &str, args: &[&str]) -> Result<Self, TodoCommandParseError> {
        let button = match name {
            "button_validate" => FormButton::Validate,
            "button_reset" => FormButton::Reset,
            "button_to_check" => FormButton::ToCheck,
            "button_set_as_checked" => FormButton::SetAsChecked,
            "button_form_apply_suggestion" => FormButton::ApplySuggestion,
            "button_apply_reco_model" => FormButton::ApplyRecoModel,
            "button_form_redirect_to_move_form" => {
                let [move_id] = args else {
                    return Err(TodoCommandParseError::MissingArgument {
                        verb: "button_clicked",
                        expected: "a move id after button_form_redirect_to_move_form",
                    });
                };
                return Ok(FormButton::RedirectToMoveForm(MoveId(parse_id(
                    "button_clicked",
                    move_id,
                )?)));
            }
            other => {
                if !args.is_empty() {
                    return Err(TodoCommandParseError::UnexpectedArguments {
                        verb: "button_clicked",
                        args: args.join(","),
                    });
                }
                return Ok(FormButton::Other(other.to_string()));
            }
        };
        if !args.is_empty() {
            return Err(TodoCommandParseError::UnexpectedArguments {
                verb: "button_clicked",
                args: args.join(","),
            });
        }
        Ok(button)
    }
}

/// One discrete edit of the proposed entry, applied server-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TodoCommand {
    TriggerMatchingRules,
    MountLineInEdit(LineIndex),
    RemoveLine(LineIndex),
    ClearEditForm,
    AddNewAmls(Vec<AmlId>),
    RemoveNewAmls(Vec<AmlId>),
    SelectReconcileModelButton(RecoModelId),
    UnselectReconcileModelButton(RecoModelId),
    ButtonClicked(FormButton),
}

impl TodoCommand {
    pub fn verb(&self) -> &'static str {
        match self {
            TodoCommand::TriggerMatchingRules => "trigger_matching_rules",
            TodoCommand::MountLineInEdit(_) => "mount_line_in_edit",
            TodoCommand::RemoveLine(_) => "remove_line",
            TodoCommand::ClearEditForm => "clear_edit_form",
            TodoCommand::AddNewAmls(_) => "add_new_amls",
            TodoCommand::RemoveNewAmls(_) => "remove_new_amls",
            TodoCommand::SelectReconcileModelButton(_) => "select_reconcile_model_button",
            TodoCommand::UnselectReconcileModelButton(_) => "unselect_reconcile_model_button",
            TodoCommand::ButtonClicked(_) => "button_clicked",
        }
    }

    /// Structural edits of the proposal, refused once the line is reconciled.
    pub fn is_edit(&self) -> bool {
        !matches!(
            self,
            TodoCommand::TriggerMatchingRules | TodoCommand::ButtonClicked(_)
        )
    }
}

impl fmt::Display for TodoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        match self {
            TodoCommand::TriggerMatchingRules | TodoCommand::ClearEditForm => Ok(()),
            TodoCommand::MountLineInEdit(index) | TodoCommand::RemoveLine(index) => {
                write!(f, ",{index}")
            }
            TodoCommand::AddNewAmls(ids) | TodoCommand::RemoveNewAmls(ids) => {
                for id in ids {
                    write!(f, ",{id}")?;
                }
                Ok(())
            }
            TodoCommand::SelectReconcileModelButton(id)
            | TodoCommand::UnselectReconcileModelButton(id) => write!(f, ",{id}"),
            TodoCommand::ButtonClicked(button) => {
                write!(f, ",{}", button.name())?;
                if let FormButton::RedirectToMoveForm(move_id) = button {
                    write!(f, ",{move_id}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for TodoCommand {
    type Err = TodoCommandParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TodoCommandParseError::Empty);
        }
        let mut parts = raw.split(',').map(str::trim);
        let verb = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match verb {
            "trigger_matching_rules" => {
                no_args("trigger_matching_rules", &args)?;
                Ok(TodoCommand::TriggerMatchingRules)
            }
            "clear_edit_form" => {
                no_args("clear_edit_form", &args)?;
                Ok(TodoCommand::ClearEditForm)
            }
            "mount_line_in_edit" => Ok(TodoCommand::MountLineInEdit(single_index(
                "mount_line_in_edit",
                &args,
            )?)),
            "remove_line" => Ok(TodoCommand::RemoveLine(single_index("remove_line", &args)?)),
            "add_new_amls" => Ok(TodoCommand::AddNewAmls(id_list("add_new_amls", &args)?)),
            "remove_new_amls" => Ok(TodoCommand::RemoveNewAmls(id_list(
                "remove_new_amls",
                &args,
            )?)),
            "select_reconcile_model_button" => Ok(TodoCommand::SelectReconcileModelButton(
                RecoModelId(single_id("select_reconcile_model_button", &args)?),
            )),
            "unselect_reconcile_model_button" => Ok(TodoCommand::UnselectReconcileModelButton(
                RecoModelId(single_id("unselect_reconcile_model_button", &args)?),
            )),
            "button_clicked" => {
                let Some((name, rest)) = args.split_first() else {
                    return Err(TodoCommandParseError::MissingArgument {
                        verb: "button_clicked",
                        expected: "a button name",
                    });
                };
                Ok(TodoCommand::ButtonClicked(FormButton::parse(name, rest)?))
            }
            other => Err(TodoCommandParseError::UnknownVerb(other.to_string())),
        }
    }
}

impl Serialize for TodoCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TodoCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn no_args(verb: &'static str, args: &[&str]) -> Result<(), TodoCommandParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(TodoCommandParseError::UnexpectedArguments {
            verb,
            args: args.join(","),
        })
    }
}

fn single_index(verb: &'static str, args: &[&str]) -> Result<LineIndex, TodoCommandParseError> {
    match args {
        [index] if !index.is_empty() => Ok(LineIndex::new(*index)),
        [] | [_] => Err(TodoCommandParseError::MissingArgument {
            verb,
            expected: "a line index",
        }),
        _ => Err(TodoCommandParseError::UnexpectedArguments {
            verb,
            args: args[1..].join(","),
        }),
    }
}

fn single_id(verb: &'static str, args: &[&str]) -> Result<i64, TodoCommandParseError> {
    match args {
        [id] => parse_id(verb, id),
        [] => Err(TodoCommandParseError::MissingArgument {
            verb,
            expected: "an id",
        }),
        _ => Err(TodoCommandParseError::UnexpectedArguments {
            verb,
            args: args[1..].join(","),
        }),
    }
}

fn id_list(verb: &'static str, args: &[&str]) -> Result<Vec<AmlId>, TodoCommandParseError> {
    if args.is_empty() {
        return Err(TodoCommandParseError::MissingArgument {
            verb,
            expected: "at least one journal item id",
        });
    }
    args.iter()
        .map(|raw| parse_id(verb, raw).map(AmlId))
        .collect()
}

fn parse_id(verb: &'static str, raw: &str) -> Result<i64, TodoCommandParseError> {
    raw.parse::<i64>()
        .map_err(|_| TodoCommandParseError::InvalidId {
            verb,
            value: raw.to_string(),
        })
}
