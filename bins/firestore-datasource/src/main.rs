mod plugin;

use plugin::FirestorePlugin;

#[grafana_plugin_sdk::main(services(data, diagnostics), init_subscriber = true)]
async fn plugin() -> FirestorePlugin {
    FirestorePlugin::new()
}
