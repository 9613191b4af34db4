/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Diesel schema for the metadata store tables.
//!
//! Pipeline and schedule definitions are operator-authored documents, so
//! their structured parts (`steps`, `dag`, `trigger`, `params`) live in
//! JSONB columns and deserialize into domain types at the data access
//! layer. Schema provisioning is external; these definitions only describe
//! the tables the engine consumes.

diesel::table! {
    etl_pipelines (id) {
        id -> Text,
        name -> Text,
        version -> Int4,
        description -> Nullable<Text>,
        trigger -> Nullable<Jsonb>,
        parameters -> Nullable<Jsonb>,
        steps -> Nullable<Jsonb>,
        status -> Text,
    }
}

diesel::table! {
    etl_schedules (id) {
        id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        cron_expr -> Text,
        timezone -> Text,
        enabled -> Bool,
        dag -> Nullable<Jsonb>,
        last_run_at -> Nullable<Timestamptz>,
        next_run_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    etl_executions (id) {
        id -> Uuid,
        schedule_id -> Nullable<Text>,
        schedule_name -> Nullable<Text>,
        pipeline_id -> Nullable<Text>,
        pipeline_name -> Nullable<Text>,
        status -> Text,
        trigger -> Text,
        params -> Nullable<Jsonb>,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
        duration -> Nullable<Int8>,
        error_message -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    etl_execution_tasks (id) {
        id -> Uuid,
        execution_id -> Uuid,
        node_id -> Text,
        node_name -> Text,
        status -> Text,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
        input_rows -> Nullable<Int8>,
        output_rows -> Nullable<Int8>,
        error -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    etl_execution_logs (id) {
        id -> Uuid,
        execution_id -> Uuid,
        task_id -> Nullable<Uuid>,
        level -> Text,
        message -> Text,
        metadata -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    etl_pipelines,
    etl_schedules,
    etl_executions,
    etl_execution_tasks,
    etl_execution_logs
);
