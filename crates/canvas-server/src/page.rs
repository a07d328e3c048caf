const WS_PORT_PLACEHOLDER: &str = "__WS_PORT__";

/// The whole viewer is one self-contained document: no build step, inline
/// WebSocket client.
pub fn canvas_page(ws_port: u16) -> String {
    CANVAS_TEMPLATE.replace(WS_PORT_PLACEHOLDER, &ws_port.to_string())
}

const CANVAS_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8" />
<meta name="viewport" content="width=device-width, initial-scale=1" />
<title>agent-canvas</title>
<style>
	* { margin: 0; padding: 0; box-sizing: border-box; }
	body {
		font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
		background: #1a1a1a;
		color: #e0e0e0;
		height: 100vh;
		display: flex;
		flex-direction: column;
	}
	#toolbar {
		display: flex;
		align-items: center;
		gap: 8px;
		padding: 8px 12px;
		background: #111;
		border-bottom: 1px solid #333;
		font-size: 13px;
		flex-shrink: 0;
	}
	#toolbar .logo { font-weight: 600; color: #fff; margin-right: 12px; }
	#toolbar button, #toolbar input {
		background: #2a2a2a;
		border: 1px solid #444;
		color: #ccc;
		padding: 4px 8px;
		border-radius: 4px;
		font-size: 12px;
	}
	#toolbar button { cursor: pointer; }
	#toolbar button:hover { background: #3a3a3a; color: #fff; }
	#io-panel { width: 110px; }
	#io-path { width: 220px; }
	#toolbar .status { margin-left: auto; font-size: 11px; color: #666; }
	#toolbar .status.connected { color: #4a4; }
	#about { padding: 6px 12px; background: #161616; border-bottom: 1px solid #333; font-size: 12px; color: #999; }
	#about summary { cursor: pointer; color: #bbb; }
	#about p { margin-top: 4px; line-height: 1.5; }
	#about code { color: #ddd; }
	#panels { display: flex; flex: 1; overflow: hidden; }
	.panel {
		flex: 1;
		display: flex;
		flex-direction: column;
		border-right: 1px solid #333;
		min-width: 200px;
	}
	.panel:last-child { border-right: none; }
	.panel-header {
		display: flex;
		align-items: center;
		justify-content: space-between;
		padding: 4px 8px;
		background: #1e1e1e;
		border-bottom: 1px solid #333;
		font-size: 11px;
		color: #888;
	}
	.panel-header input {
		background: transparent;
		border: none;
		color: #aaa;
		font-size: 11px;
		width: 160px;
		outline: none;
	}
	.panel-header .close-btn { cursor: pointer; color: #666; padding: 0 4px; }
	.panel-header .close-btn:hover { color: #f66; }
	.canvas-frame { flex: 1; border: none; background: #fff; }
	.empty-state {
		flex: 1;
		display: flex;
		align-items: center;
		justify-content: center;
		color: #555;
		font-size: 14px;
		background: #fff;
	}
</style>
</head>
<body>
<div id="toolbar">
	<span class="logo">&#9703; agent-canvas</span>
	<button onclick="addPanel()">+ Panel</button>
	<input id="io-panel" placeholder="panel" value="default" />
	<input id="io-path" placeholder="path/to/file.html" />
	<button onclick="pushToFile()">&#8593; Push</button>
	<button onclick="pullFromFile()">&#8595; Pull</button>
	<span id="status" class="status">connecting...</span>
</div>
<details id="about">
	<summary>What is this?</summary>
	<p>A live canvas for agents. Anything POSTed to <code>/render</code> as
	<code>{"html": "...", "panel": "name"}</code> shows up here instantly. Push saves a
	panel to a file under the project root; Pull loads a file into a panel. Panels
	survive restarts.</p>
</details>
<div id="panels"></div>

<script>
var WS_URL = (location.protocol === 'https:')
	? ('wss://' + location.host + '/ws')
	: ('ws://' + location.hostname + ':__WS_PORT__/ws');
let ws;
let reconnectTimer;

function panelEl(name) {
	return document.querySelector('[data-panel="' + name + '"]');
}

function connect() {
	ws = new WebSocket(WS_URL);
	ws.onopen = () => {
		document.getElementById('status').textContent = '● connected';
		document.getElementById('status').className = 'status connected';
	};
	ws.onclose = () => {
		document.getElementById('status').textContent = '○ disconnected';
		document.getElementById('status').className = 'status';
		clearTimeout(reconnectTimer);
		reconnectTimer = setTimeout(connect, 1000);
	};
	ws.onmessage = (e) => {
		const msg = JSON.parse(e.data);
		switch (msg.type) {
			case 'render': updatePanel(msg.panel || 'default', msg.html); break;
			case 'panel_created': ensurePanel(msg.panel); break;
			case 'panel_renamed': movePanel(msg.from, msg.to); break;
			case 'panel_deleted': dropPanel(msg.panel); break;
		}
	};
}

function ensurePanel(name) {
	let panel = panelEl(name);
	if (panel) return panel;
	panel = document.createElement('div');
	panel.className = 'panel';
	panel.dataset.panel = name;
	panel.innerHTML =
		'<div class="panel-header">' +
		'<input value="' + name + '" onchange="renamePanel(this)" />' +
		'<span class="close-btn" onclick="removePanel(this)">✕</span>' +
		'</div>' +
		'<div class="empty-state" data-empty="true">waiting for agent...</div>';
	document.getElementById('panels').appendChild(panel);
	return panel;
}

function updatePanel(name, html) {
	const panel = ensurePanel(name);
	const empty = panel.querySelector('[data-empty]');
	if (empty) empty.remove();
	let frame = panel.querySelector('iframe');
	if (!frame) {
		frame = document.createElement('iframe');
		frame.className = 'canvas-frame';
		frame.sandbox = 'allow-scripts allow-same-origin';
		panel.appendChild(frame);
	}
	frame.srcdoc = html;
}

function movePanel(from, to) {
	const panel = panelEl(from);
	if (!panel) { ensurePanel(to); return; }
	panel.dataset.panel = to;
	panel.querySelector('.panel-header input').value = to;
}

function dropPanel(name) {
	const panel = panelEl(name);
	if (panel) panel.remove();
}

async function api(method, url, body) {
	const res = await fetch(url, {
		method,
		headers: { 'Content-Type': 'application/json' },
		body: body === undefined ? undefined : JSON.stringify(body)
	});
	return res.json();
}

async function addPanel() {
	const data = await api('POST', '/panels', {});
	if (!data.ok) alert('Error: ' + data.error);
}

async function removePanel(btn) {
	const name = btn.closest('.panel').dataset.panel;
	const data = await api('DELETE', '/panels/' + encodeURIComponent(name));
	if (!data.ok) alert('Error: ' + data.error);
}

async function renamePanel(input) {
	const panel = input.closest('.panel');
	const oldName = panel.dataset.panel;
	const newName = input.value.trim();
	if (!newName || newName === oldName) { input.value = oldName; return; }
	const data = await api('PATCH', '/panels/' + encodeURIComponent(oldName), { newName });
	if (!data.ok) {
		input.value = oldName;
		alert('Error: ' + data.error);
	}
}

function ioFields() {
	return {
		panel: document.getElementById('io-panel').value.trim() || 'default',
		path: document.getElementById('io-path').value.trim()
	};
}

async function pushToFile() {
	const { panel, path } = ioFields();
	if (!path) return;
	const data = await api('POST', '/push', { panel, path });
	alert(data.ok ? 'Pushed to ' + data.path : 'Error: ' + data.error);
}

async function pullFromFile() {
	const { panel, path } = ioFields();
	if (!path) return;
	const data = await api('POST', '/pull', { panel, path });
	if (!data.ok) alert('Error: ' + data.error);
}

connect();
</script>
</body>
</html>
"##;
