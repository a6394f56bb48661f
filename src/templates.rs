use chrono::Utc;
use serde_json::{json, Value};

use crate::types::PARAMETERS_TAG;

/// Splits text into notebook source lines, keeping line endings.
fn source(text: &str) -> Value {
    let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    json!(lines)
}

fn code(text: &str) -> Value {
    json!({
        "cell_type": "code",
        "execution_count": null,
        "metadata": {},
        "outputs": [],
        "source": source(text),
    })
}

fn markdown(text: &str) -> Value {
    json!({
        "cell_type": "markdown",
        "metadata": {},
        "source": source(text),
    })
}

/// The starter notebook written by `init`.
pub fn starter_notebook(agent_name: &str) -> String {
    let mut parameters = code(&format!(
        "# Configuration\n\
         data_agent_name = \"{name}\"\n\
         lakehouse_name = \"\"\n\
         table_names = []\n",
        name = agent_name
    ));
    parameters["metadata"] = json!({ "tags": [PARAMETERS_TAG] });

    let cells = vec![
        markdown(&format!(
            "# Data Agent: {}\n\nConfigure the data sources and instructions below, then run `dad compile`.\n",
            agent_name
        )),
        code("%pip install fabric-data-agent-sdk\n"),
        parameters,
        code(
            "from fabric.dataagent.client import (\n    \
             FabricDataAgentManagement,\n    \
             create_data_agent,\n)\n",
        ),
        markdown("## Create the agent and attach its data sources\n"),
        code(
            "data_agent = create_data_agent(data_agent_name)\n\
             data_agent = FabricDataAgentManagement(data_agent_name)\n\
             \n\
             if lakehouse_name:\n    \
             data_agent.add_datasource(lakehouse_name, type=\"lakehouse\")\n",
        ),
        markdown("## Instructions\n"),
        code(
            "data_agent.update_configuration(\n    \
             instructions=\"\"\"\n    \
             You are a helpful, precise data agent. Translate questions into SQL over the\n    \
             configured tables and summarize the results clearly.\n    \
             \"\"\"\n)\n\
             data_agent.publish()\n",
        ),
    ];

    let notebook = json!({
        "cells": cells,
        "metadata": {
            "kernelspec": {
                "display_name": "Synapse PySpark",
                "language": "Python",
                "name": "synapse_pyspark"
            },
            "language_info": { "name": "python" }
        },
        "nbformat": 4,
        "nbformat_minor": 5
    });

    let mut rendered = serde_json::to_string_pretty(&notebook).unwrap_or_default();
    rendered.push('\n');
    rendered
}

/// README placed next to the starter notebook.
pub fn readme(agent_name: &str, folder: &str) -> String {
    format!(
        "# Data Agent: {name}\n\
         \n\
         Created: {created}\n\
         Folder: {folder}\n\
         \n\
         ## Files\n\
         \n\
         - `{folder}.ipynb` - the data agent notebook\n\
         - `{folder}_fabric.py` - compiled Fabric source (after `dad compile`)\n\
         - `README.md` - this file\n\
         \n\
         ## Next steps\n\
         \n\
         1. Edit `{folder}.ipynb`: set `lakehouse_name`, `table_names` and the instructions.\n\
         2. `dad compile \"{name}\"`\n\
         3. `dad upload \"{name}\"`\n\
         4. `dad run \"{name}\"`\n\
         5. `dad publish \"{name}\" --url <endpoint>`\n\
         6. `dad test \"{name}\"`\n",
        name = agent_name,
        folder = folder,
        created = Utc::now().format("%Y-%m-%d %H:%M:%S"),
    )
}
