mod interactive;
