// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Privacy consent level, driving which categories of telemetry the
/// assembler is permitted to emit.
///
/// Ordering matters: a higher level is a superset of the capabilities of
/// every lower one.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum DataCollectionLevel {
    #[serde(rename = "Off", alias = "off", alias = "OFF", alias = "0")]
    Off = 0,
    #[serde(
        rename = "Performance",
        alias = "performance",
        alias = "PERFORMANCE",
        alias = "1"
    )]
    Performance = 1,
    #[serde(
        rename = "UserBehavior",
        alias = "user_behavior",
        alias = "USER_BEHAVIOR",
        alias = "2"
    )]
    UserBehavior = 2,
}

impl fmt::Display for DataCollectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataCollectionLevel::Off => "Off",
            DataCollectionLevel::Performance => "Performance",
            DataCollectionLevel::UserBehavior => "UserBehavior",
        })
    }
}

impl DataCollectionLevel {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn is_session_number_reporting_allowed(self) -> bool {
        self >= DataCollectionLevel::Performance
    }

    pub fn is_action_reporting_allowed(self) -> bool {
        self >= DataCollectionLevel::UserBehavior
    }

    pub fn is_value_reporting_allowed(self) -> bool {
        self >= DataCollectionLevel::UserBehavior
    }

    pub fn is_event_reporting_allowed(self) -> bool {
        self >= DataCollectionLevel::UserBehavior
    }

    pub fn is_session_reporting_allowed(self) -> bool {
        self >= DataCollectionLevel::Performance
    }

    pub fn is_web_request_tracing_allowed(self) -> bool {
        self >= DataCollectionLevel::Performance
    }

    pub fn is_user_identification_allowed(self) -> bool {
        self >= DataCollectionLevel::UserBehavior
    }

    pub fn is_device_id_sending_allowed(self) -> bool {
        self == DataCollectionLevel::UserBehavior
    }
}

/// Crash/error consent level, independent of [`DataCollectionLevel`].
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum CrashReportingLevel {
    #[serde(rename = "OptOutCrashes", alias = "opt_out_crashes", alias = "0")]
    OptOutCrashes = 0,
    #[serde(rename = "OptInCrashes", alias = "opt_in_crashes", alias = "1")]
    OptInCrashes = 1,
    #[serde(rename = "OptOutErrors", alias = "opt_out_errors", alias = "2")]
    OptOutErrors = 2,
}

impl fmt::Display for CrashReportingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrashReportingLevel::OptOutCrashes => "OptOutCrashes",
            CrashReportingLevel::OptInCrashes => "OptInCrashes",
            CrashReportingLevel::OptOutErrors => "OptOutErrors",
        })
    }
}

impl CrashReportingLevel {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn is_crash_reporting_allowed(self) -> bool {
        !matches!(self, CrashReportingLevel::OptOutCrashes)
    }

    pub fn is_error_reporting_allowed(self) -> bool {
        !matches!(self, CrashReportingLevel::OptOutErrors)
    }
}
