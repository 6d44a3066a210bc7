//! Headless playground.
//!
//! Drives a counter component through a few clicks, with a persisted
//! preference, a hydrated greeting and the devtool logging every change.
//!
//! Run with: cargo run --example playground

use gpui_signal_bridge::devtools::{install_document, HeadlessDocument};
use gpui_signal_bridge::prelude::*;
use gpui_signal_bridge::{mount_store_devtool, SetSignal};
use std::rc::Rc;

struct App {
    component: Component,
    count: Signal<i32>,
    greeting: Signal<String>,
    step: Signal<i32>,
}

impl App {
    fn new() -> Self {
        Self {
            component: Component::new("app"),
            count: create_signal(0),
            greeting: create_signal(String::new()),
            step: create_signal_storage("step", 1),
        }
    }

    /// One render pass; returns the setter wired to the button.
    fn render(&self) -> SetSignal<i32> {
        self.component.render(|cx| {
            use_hydrate_signal(&self.greeting, "hello from the server".to_string());
            let greeting = use_signal_value(cx, &self.greeting);
            let step = use_signal_value(cx, &self.step);
            let (count, set_count) = use_signal(cx, &self.count);
            tracing::info!(%greeting, step, count, "render");
            set_count
        })
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let app = App::new();
    install_document(Rc::new(HeadlessDocument::new()));
    mount_store_devtool("count", &app.count, None);

    let mut set_count = app.render();
    for click in 0..3 {
        let step = app.step.get_untracked();
        set_count.update(move |count| count + step);
        if click == 1 {
            app.step.set(2);
        }
        if app.component.needs_render() {
            set_count = app.render();
        }
    }

    app.component.unmount();
    tracing::info!(
        stored_step = ?default_store().get_item("step").ok().flatten(),
        renders = app.component.renders(),
        "done"
    );
}
