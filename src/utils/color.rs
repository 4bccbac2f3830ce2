// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! ANSI color helpers for log output.

use std::fmt::{Debug, Display};

pub const RED: &str = "\x1b[31;1m";
pub const GREY: &str = "\x1b[0;0m";
pub const MINT: &str = "\x1b[38;5;48;1m";
pub const YELLOW: &str = "\x1b[33;1m";
pub const PINK: &str = "\x1b[38;5;161;1m";
pub const LAVENDER: &str = "\x1b[38;5;183;1m";
pub const RESET: &str = "\x1b[0;0m";

pub trait Color: Display {
    fn color(&self, color: &str) -> String {
        format!("{color}{self}{RESET}")
    }

    fn red(&self) -> String {
        self.color(RED)
    }
    fn grey(&self) -> String {
        self.color(GREY)
    }
    fn mint(&self) -> String {
        self.color(MINT)
    }
    fn yellow(&self) -> String {
        self.color(YELLOW)
    }
    fn pink(&self) -> String {
        self.color(PINK)
    }
    fn lavender(&self) -> String {
        self.color(LAVENDER)
    }
}

impl<T: Display> Color for T {}

pub trait DebugColor: Debug {
    fn debug_color(&self, color: &str) -> String {
        format!("{color}{self:?}{RESET}")
    }

    fn debug_red(&self) -> String {
        self.debug_color(RED)
    }
    fn debug_lavender(&self) -> String {
        self.debug_color(LAVENDER)
    }
}

impl<T: Debug> DebugColor for T {}
