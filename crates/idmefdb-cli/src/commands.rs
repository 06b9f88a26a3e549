//! Subcommands and their execution against a database.

use clap::{Subcommand, ValueEnum};
use tracing::debug;

use idmefdb_core::{Db, IdentOrder, Limit, PathSelection};
use idmefdb_lang::{criteria_from_str, selected_path_from_str};
use idmefdb_proto::Criteria;

use crate::error::CliError;
use crate::formatter::{Formatter, ValueRows};

/// Identifier ordering accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OrderArg {
    #[default]
    None,
    Asc,
    Desc,
}

impl From<OrderArg> for IdentOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::None => IdentOrder::Unordered,
            OrderArg::Asc => IdentOrder::CreateTimeAsc,
            OrderArg::Desc => IdentOrder::CreateTimeDesc,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Select values, e.g. `--select 'count(alert.create_time)'`
    Values {
        /// Selection string, repeatable
        #[arg(short, long = "select", required = true)]
        select: Vec<String>,

        /// Criteria string
        #[arg(short, long)]
        criteria: Option<String>,

        /// Drop duplicate rows
        #[arg(long)]
        distinct: bool,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        offset: Option<u64>,
    },

    /// List message identifiers
    Idents {
        /// List heartbeats instead of alerts
        #[arg(long)]
        heartbeat: bool,

        /// Criteria string
        #[arg(short, long)]
        criteria: Option<String>,

        /// Order by creation time
        #[arg(long, value_enum, default_value_t = OrderArg::None)]
        order: OrderArg,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        offset: Option<u64>,
    },

    /// Show the database format
    Format,
}

/// Run `command` and render its output.
pub fn execute(db: &Db, command: &Command, formatter: &dyn Formatter) -> Result<String, CliError> {
    match command {
        Command::Values {
            select,
            criteria,
            distinct,
            limit,
            offset,
        } => {
            let selection = parse_selection(select)?;
            let criteria = parse_criteria(criteria.as_deref())?;
            let values = fetch_values(
                db,
                &selection,
                criteria.as_ref(),
                *distinct,
                Limit::new(*limit, *offset),
            )?;
            Ok(formatter.format_values(&values))
        }
        Command::Idents {
            heartbeat,
            criteria,
            order,
            limit,
            offset,
        } => {
            let criteria = parse_criteria(criteria.as_deref())?;
            let limit = Limit::new(*limit, *offset);
            let result = if *heartbeat {
                db.get_heartbeat_idents(criteria.as_ref(), limit, (*order).into())?
            } else {
                db.get_alert_idents(criteria.as_ref(), limit, (*order).into())?
            };
            let idents = result.collect::<Result<Vec<_>, _>>()?;
            Ok(formatter.format_idents(&idents))
        }
        Command::Format => Ok(formatter.format_message(db.format().name())),
    }
}

/// Compile selection strings, reporting errors against the string at fault.
pub fn parse_selection(sources: &[String]) -> Result<PathSelection, CliError> {
    let mut selection = PathSelection::new();
    for source in sources {
        let selected = selected_path_from_str(source).map_err(|e| CliError::lang(e, source))?;
        selection.add(selected);
    }
    Ok(selection)
}

pub fn parse_criteria(source: Option<&str>) -> Result<Option<Criteria>, CliError> {
    source
        .map(|source| criteria_from_str(source).map_err(|e| CliError::lang(e, source)))
        .transpose()
}

fn fetch_values(
    db: &Db,
    selection: &PathSelection,
    criteria: Option<&Criteria>,
    distinct: bool,
    limit: Limit,
) -> Result<ValueRows, CliError> {
    let headers = selection
        .iter()
        .map(|selected| selected.object().to_string())
        .collect();

    let rows = db
        .get_values(selection, criteria, distinct, limit)?
        .collect::<Result<Vec<_>, _>>()?;
    debug!(rows = rows.len(), "fetched values");

    Ok(ValueRows { headers, rows })
}
